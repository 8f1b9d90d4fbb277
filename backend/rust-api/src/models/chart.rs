use serde::{Deserialize, Serialize};

/// Positionally correlated bucket labels and counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSet {
    pub labels: Vec<String>,
    pub dataset: Vec<u64>,
}

/// Total / success / failure counts over one shared label axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub duration: String,
    pub labels: Vec<String>,
    pub total: Vec<u64>,
    pub success: Vec<u64>,
    pub failure: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    pub duration: Option<String>,
    /// Minutes east of UTC used for day and month boundaries.
    pub tz_offset_minutes: Option<i32>,
}
