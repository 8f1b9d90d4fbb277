pub mod attempt;
pub mod chart;

pub use attempt::{Attempt, CreateAttemptRequest, ExamCategory};
pub use chart::{ChartSeries, DataSet};
