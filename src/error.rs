// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型 (Error types)

use thiserror::Error;

/// 分析引擎错误
///
/// 只有配置错误会阻止构造;输入异常一律降级处理,不会出现在这里。
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("invalid zone '{name}': {reason}")]
    InvalidZone { name: String, reason: String },

    #[error("invalid threshold '{name}': {reason}")]
    InvalidThreshold { name: String, reason: String },

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalyticsError {
    pub(crate) fn zone(name: &str, reason: impl Into<String>) -> Self {
        AnalyticsError::InvalidZone {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn threshold(name: &str, reason: impl Into<String>) -> Self {
        AnalyticsError::InvalidThreshold {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = AnalyticsError> = std::result::Result<T, E>;
