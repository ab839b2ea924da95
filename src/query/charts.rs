//! Chart aggregation over filtered records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Record};
use crate::types::{Aggregation, AppError, AppResult, CellKey, CellValue, ChartType};

/// Category label used for rows whose grouping cell is missing.
pub const MISSING_CATEGORY: &str = "(missing)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub chart_type: ChartType,
    /// Empty when the client left it out; rejected as an unknown column.
    #[serde(default)]
    pub x: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarEntry {
    pub category: CellValue,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<CellValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<CellValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub bin_start: f64,
    pub bin_end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    pub dataset_id: String,
    pub chart_type: ChartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<BarEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<ScatterPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bins: Option<Vec<HistogramBin>>,
    pub config: ChartConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct ChartOptions {
    pub scatter_point_limit: usize,
    pub default_bin_count: usize,
    pub max_bin_count: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            scatter_point_limit: 500,
            default_bin_count: 10,
            max_bin_count: 1000,
        }
    }
}

/// Column positions resolved against the dataset.
struct Axes {
    x: usize,
    y: Option<usize>,
    color: Option<usize>,
}

fn resolve_axes(dataset: &Dataset, config: &ChartConfig) -> AppResult<Axes> {
    if config.x.trim().is_empty() {
        return Err(AppError::UnknownColumn("x axis column is required".to_string()));
    }
    Ok(Axes {
        x: dataset.column_index(&config.x)?,
        y: config.y.as_deref().map(|c| dataset.column_index(c)).transpose()?,
        color: config.color.as_deref().map(|c| dataset.column_index(c)).transpose()?,
    })
}

pub fn build_chart(
    dataset: &Dataset,
    records: &[&Record],
    config: &ChartConfig,
    options: &ChartOptions,
) -> AppResult<ChartResponse> {
    let axes = resolve_axes(dataset, config)?;

    let mut response = ChartResponse {
        dataset_id: dataset.id.clone(),
        chart_type: config.chart_type,
        series: None,
        points: None,
        bins: None,
        config: config.clone(),
    };

    match config.chart_type {
        ChartType::Bar => {
            response.series = Some(bar_series(records, &axes, config.aggregation)?);
        }
        ChartType::Scatter => {
            let y = axes
                .y
                .ok_or_else(|| AppError::MissingAxis("scatter charts require a y column".to_string()))?;
            response.points = Some(scatter_points(records, axes.x, y, axes.color, options.scatter_point_limit));
        }
        ChartType::Histogram => {
            let bin_count = match config.bin_count {
                None => options.default_bin_count,
                Some(n) if n >= 1 && (n as u64) <= options.max_bin_count as u64 => n as usize,
                Some(n) => {
                    return Err(AppError::InvalidRequest(format!(
                        "binCount must be within 1..={}, got {n}",
                        options.max_bin_count
                    )));
                }
            };
            let values: Vec<f64> = records.iter().filter_map(|r| r.get(axes.x).as_number()).collect();
            response.bins = Some(histogram(&values, bin_count));
        }
    }

    Ok(response)
}

fn group_label(cell: &CellValue) -> CellValue {
    if cell.is_null() {
        CellValue::Text(MISSING_CATEGORY.to_string())
    } else {
        cell.clone()
    }
}

struct BarGroup {
    category: CellValue,
    color: Option<CellValue>,
    rows: usize,
    sum: f64,
    numeric: usize,
}

fn bar_series(records: &[&Record], axes: &Axes, aggregation: Aggregation) -> AppResult<Vec<BarEntry>> {
    let y = match aggregation {
        Aggregation::Count => None,
        Aggregation::Sum | Aggregation::Avg => Some(axes.y.ok_or_else(|| {
            AppError::MissingAxis("sum and avg aggregations require a y column".to_string())
        })?),
    };

    let mut index: HashMap<(CellKey, Option<CellKey>), usize> = HashMap::new();
    let mut groups: Vec<BarGroup> = Vec::new();

    for record in records {
        let x_cell = record.get(axes.x);
        let color_cell = axes.color.map(|c| record.get(c));
        let key = (x_cell.key(), color_cell.map(CellValue::key));

        let pos = match index.get(&key).copied() {
            Some(pos) => pos,
            None => {
                index.insert(key, groups.len());
                groups.push(BarGroup {
                    category: group_label(x_cell),
                    color: color_cell.map(group_label),
                    rows: 0,
                    sum: 0.0,
                    numeric: 0,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[pos];
        group.rows += 1;
        if let Some(y) = y {
            if let Some(n) = record.get(y).as_number() {
                group.sum += n;
                group.numeric += 1;
            }
        }
    }

    Ok(groups
        .into_iter()
        .filter_map(|g| {
            let value = match aggregation {
                Aggregation::Count => g.rows as f64,
                _ if g.numeric == 0 => return None,
                Aggregation::Sum => g.sum,
                Aggregation::Avg => g.sum / g.numeric as f64,
            };
            Some(BarEntry {
                category: g.category,
                value,
                color: g.color,
            })
        })
        .collect())
}

fn scatter_points(
    records: &[&Record],
    x: usize,
    y: usize,
    color: Option<usize>,
    limit: usize,
) -> Vec<ScatterPoint> {
    let mut points: Vec<ScatterPoint> = records
        .iter()
        .filter_map(|r| {
            let px = r.get(x).as_number()?;
            let py = r.get(y).as_number()?;
            Some(ScatterPoint {
                x: px,
                y: py,
                color: color.map(|c| r.get(c).clone()),
            })
        })
        .take(limit)
        .collect();
    points.sort_by(|a, b| a.x.total_cmp(&b.x));
    points
}

/// Equal-width bins over `[min, max]`; the last bin includes `max`.
pub fn histogram(values: &[f64], bin_count: usize) -> Vec<HistogramBin> {
    let bin_count = bin_count.max(1);

    let Some((min, max)) = values.iter().fold(None, |acc: Option<(f64, f64)>, v| match acc {
        None => Some((*v, *v)),
        Some((lo, hi)) => Some((lo.min(*v), hi.max(*v))),
    }) else {
        return (0..bin_count)
            .map(|_| HistogramBin {
                bin_start: 0.0,
                bin_end: 0.0,
                count: 0,
            })
            .collect();
    };

    if min == max {
        let mut bins: Vec<HistogramBin> = (0..bin_count)
            .map(|_| HistogramBin {
                bin_start: min,
                bin_end: min,
                count: 0,
            })
            .collect();
        bins[0].count = values.len();
        return bins;
    }

    let width = (max - min) / bin_count as f64;
    let mut bins: Vec<HistogramBin> = (0..bin_count)
        .map(|i| HistogramBin {
            bin_start: min + width * i as f64,
            bin_end: if i + 1 == bin_count {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for value in values {
        let mut idx = (((value - min) / width).floor() as usize).min(bin_count - 1);
        // Float rounding can land a value one bin off its emitted edges.
        while idx > 0 && *value < bins[idx].bin_start {
            idx -= 1;
        }
        while idx + 1 < bin_count && *value >= bins[idx].bin_end {
            idx += 1;
        }
        bins[idx].count += 1;
    }
    bins
}
