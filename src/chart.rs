//! Chart-ready series for the front-end display

use crate::core::market::PriceMatrix;
use serde::Serialize;

/// Line colors cycled across instruments.
const COLOR_PALETTE: [&str; 7] = ["red", "green", "blue", "yellow", "orange", "gray", "purple"];

#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub label: String,
    /// One entry per label; `None` serializes as `null` where an
    /// instrument has no observation.
    pub data: Vec<Option<f64>>,
    #[serde(rename = "borderColor")]
    pub border_color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartSeries>,
}

/// Mean-normalize a series so different price levels share one axis:
/// `(x - mean) / mean`, keeping gaps in place.
fn scale(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return values.to_vec();
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    if mean == 0.0 {
        return values.to_vec();
    }
    values
        .iter()
        .map(|v| v.map(|x| (x - mean) / mean))
        .collect()
}

impl ChartData {
    pub fn from_matrix(matrix: &PriceMatrix, scaled: bool) -> Self {
        let labels = matrix
            .dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();

        let datasets = matrix
            .columns
            .iter()
            .enumerate()
            .map(|(i, (key, closes))| ChartSeries {
                label: key.clone(),
                data: if scaled { scale(closes) } else { closes.clone() },
                border_color: COLOR_PALETTE[i % COLOR_PALETTE.len()].to_string(),
            })
            .collect();

        ChartData { labels, datasets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::market::PricePoint;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn matrix() -> PriceMatrix {
        let points = vec![
            PricePoint {
                date: date(2024, 1, 10),
                instrument_key: "a".to_string(),
                close: 90.0,
                last_refreshed: date(2024, 1, 10),
            },
            PricePoint {
                date: date(2024, 1, 11),
                instrument_key: "a".to_string(),
                close: 110.0,
                last_refreshed: date(2024, 1, 11),
            },
            PricePoint {
                date: date(2024, 1, 11),
                instrument_key: "b".to_string(),
                close: 50.0,
                last_refreshed: date(2024, 1, 11),
            },
        ];
        PriceMatrix::from_points(&points)
    }

    #[test]
    fn scaled_series_center_on_zero() {
        let chart = ChartData::from_matrix(&matrix(), true);

        assert_eq!(chart.labels, vec!["2024-01-10", "2024-01-11"]);
        assert_eq!(chart.datasets.len(), 2);

        let a = &chart.datasets[0];
        assert_eq!(a.label, "a");
        assert_eq!(a.data, vec![Some(-0.1), Some(0.1)]);

        // "b" has a gap on the first date, preserved as null.
        let b = &chart.datasets[1];
        assert_eq!(b.data[0], None);
        assert_eq!(b.data[1], Some(0.0));
    }

    #[test]
    fn unscaled_series_pass_prices_through() {
        let chart = ChartData::from_matrix(&matrix(), false);
        assert_eq!(chart.datasets[0].data, vec![Some(90.0), Some(110.0)]);
    }

    #[test]
    fn gaps_serialize_as_null() {
        let chart = ChartData::from_matrix(&matrix(), false);
        let json = serde_json::to_string(&chart).unwrap();
        assert!(json.contains("null"));
        assert!(json.contains("\"borderColor\":\"red\""));
    }
}
