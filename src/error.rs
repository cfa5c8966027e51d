//! 统一错误处理模块
//!
//! 提供整站翻译流水线的统一错误类型定义和处理机制。
//! 组件内部错误（单页抓取、单个翻译源、单个元素）由调用方降级处理，
//! 只有编排层面的失败才会以 `Job` 形式终止任务。

// 第三方crate导入
use thiserror::Error;

/// 翻译流水线统一错误类型
#[derive(Error, Debug)]
pub enum TranslationError {
    /// 单个页面抓取失败（网络、超时、非HTML）
    #[error("页面抓取失败 [{url}]: {message}")]
    Fetch {
        /// 请求地址
        url: String,
        /// 错误消息
        message: String,
        /// HTTP状态码（如果适用）
        status_code: Option<u16>,
    },

    /// 整站爬取失败（例如起始页不可达）
    #[error("站点爬取失败: {0}")]
    Crawl(String),

    /// 资源文件或HTML解析失败
    #[error("解析失败: {0}")]
    Parse(String),

    /// 无法识别的资源文件格式
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),

    /// 翻译源调用失败
    #[error("翻译源 {provider} 调用失败: {message}")]
    Provider {
        /// 翻译源标识
        provider: String,
        /// 错误消息
        message: String,
        /// HTTP状态码（如果适用）
        status_code: Option<u16>,
    },

    /// HTML重建失败
    #[error("HTML重建失败: {0}")]
    Reconstruction(String),

    /// 打包失败
    #[error("打包失败: {0}")]
    Archive(String),

    /// 结果存储失败
    #[error("结果存储失败: {0}")]
    Storage(String),

    /// 任务执行失败（终止性错误）
    #[error("翻译失败: {0}")]
    Job(String),

    /// 任务被外部取消
    #[error("任务已取消: {0}")]
    Cancelled(String),

    /// 配置错误
    #[error("配置错误 [{field}]: {reason}")]
    Configuration {
        /// 配置项名称
        field: String,
        /// 错误原因
        reason: String,
    },

    /// 输入验证错误
    #[error("输入验证失败 [{input}]: {reason}")]
    InputValidation {
        /// 输入值
        input: String,
        /// 验证失败原因
        reason: String,
    },

    /// 文件读写错误
    #[error("文件操作失败: {0}")]
    Io(#[from] std::io::Error),

    /// 内部处理错误（包装anyhow::Error）
    #[error("内部处理错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TranslationError {
    /// 检查错误是否值得重试
    ///
    /// 网络类错误和服务端 5xx/429 可重试，客户端错误与数据错误不可重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::Fetch { status_code, .. }
            | TranslationError::Provider { status_code, .. } => match status_code {
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            TranslationError::Storage(_) => true,
            _ => false,
        }
    }

    /// 面向用户的错误描述，不包含内部堆栈信息
    pub fn user_message(&self) -> String {
        match self {
            TranslationError::Job(message) => message.clone(),
            TranslationError::Internal(_) => "内部处理错误".to_string(),
            other => other.to_string(),
        }
    }
}

/// 统一结果类型别名
pub type Result<T> = std::result::Result<T, TranslationError>;

/// 便捷的错误创建宏
#[macro_export]
macro_rules! translation_error {
    (fetch, $url:expr, $msg:expr) => {
        $crate::error::TranslationError::Fetch {
            url: $url.to_string(),
            message: $msg.to_string(),
            status_code: None,
        }
    };
    (fetch, $url:expr, $msg:expr, $code:expr) => {
        $crate::error::TranslationError::Fetch {
            url: $url.to_string(),
            message: $msg.to_string(),
            status_code: Some($code),
        }
    };
    (provider, $id:expr, $msg:expr) => {
        $crate::error::TranslationError::Provider {
            provider: $id.to_string(),
            message: $msg.to_string(),
            status_code: None,
        }
    };
    (provider, $id:expr, $msg:expr, $code:expr) => {
        $crate::error::TranslationError::Provider {
            provider: $id.to_string(),
            message: $msg.to_string(),
            status_code: Some($code),
        }
    };
    (parse, $details:expr) => {
        $crate::error::TranslationError::Parse($details.to_string())
    };
    (config, $field:expr, $reason:expr) => {
        $crate::error::TranslationError::Configuration {
            field: $field.to_string(),
            reason: $reason.to_string(),
        }
    };
    (input_validation, $input:expr, $reason:expr) => {
        $crate::error::TranslationError::InputValidation {
            input: $input.to_string(),
            reason: $reason.to_string(),
        }
    };
}

/// 从reqwest::Error转换为TranslationError
impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        TranslationError::Fetch {
            url,
            message: error.to_string(),
            status_code: error.status().map(|s| s.as_u16()),
        }
    }
}

/// 从serde_json::Error转换为TranslationError
impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::Parse(format!("JSON格式错误: {}", error))
    }
}

/// 从quick_xml::Error转换为TranslationError
impl From<quick_xml::Error> for TranslationError {
    fn from(error: quick_xml::Error) -> Self {
        TranslationError::Parse(format!("XML格式错误: {}", error))
    }
}

/// 从zip::result::ZipError转换为TranslationError
impl From<zip::result::ZipError> for TranslationError {
    fn from(error: zip::result::ZipError) -> Self {
        TranslationError::Archive(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TranslationError::Fetch {
            url: "https://example.com".to_string(),
            message: "Connection failed".to_string(),
            status_code: Some(500),
        };

        assert_eq!(
            format!("{}", err),
            "页面抓取失败 [https://example.com]: Connection failed"
        );
    }

    #[test]
    fn test_error_macro() {
        let err = translation_error!(provider, "deepl", "quota exceeded", 456);
        match err {
            TranslationError::Provider { provider, message, status_code } => {
                assert_eq!(provider, "deepl");
                assert_eq!(message, "quota exceeded");
                assert_eq!(status_code, Some(456));
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_anyhow_conversion() {
        let anyhow_err = anyhow::anyhow!("Test anyhow error");
        let translation_err: TranslationError = anyhow_err.into();
        assert!(matches!(translation_err, TranslationError::Internal(_)));
        assert_eq!(translation_err.user_message(), "内部处理错误");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(translation_error!(fetch, "u", "timeout").is_retryable());
        assert!(translation_error!(provider, "api", "busy", 503).is_retryable());
        assert!(translation_error!(provider, "api", "slow down", 429).is_retryable());
        assert!(!translation_error!(provider, "api", "forbidden", 403).is_retryable());
        assert!(!translation_error!(parse, "bad json").is_retryable());
    }

    #[test]
    fn test_json_error_becomes_parse_error() {
        let err: TranslationError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(err, TranslationError::Parse(_)));
    }
}
