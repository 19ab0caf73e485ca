use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("模板错误: {0}")]
    Template(#[from] minijinja::Error),

    #[error("实例查询错误: {0}")]
    Lookup(String),

    #[error("配置校验错误: {0}")]
    Check(String),

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

/// 应用程序Result类型别名
pub type AppResult<T> = Result<T, AppError>;

/// 错误构造辅助函数
impl AppError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn lookup<T: Into<String>>(msg: T) -> Self {
        Self::Lookup(msg.into())
    }

    pub fn check<T: Into<String>>(msg: T) -> Self {
        Self::Check(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AppError::config("测试配置错误");
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.to_string(), "配置错误: 测试配置错误");
    }

    #[test]
    fn test_lookup_error() {
        let err = AppError::lookup("ELB不存在");
        assert!(matches!(err, AppError::Lookup(_)));
        assert_eq!(err.to_string(), "实例查询错误: ELB不存在");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: AppError = io_err.into();
        assert!(matches!(err, AppError::Io(_)));
    }
}
