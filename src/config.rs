use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 应用程序配置
///
/// 与TOML配置文件一一对应，加载后只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 轮询间隔（秒）
    pub polling_seconds: u64,
    /// 模板文件路径
    pub source: String,
    /// 输出文件路径
    pub destination: String,
    /// 写出文件后执行的重载命令（可选）
    #[serde(default)]
    pub command: Option<String>,
    /// 写出文件前执行的校验命令（可选），命令中的 `{}` 会被替换为渲染结果的临时文件路径
    #[serde(default)]
    pub check: Option<String>,
    /// 服务名 → 服务查询配置
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
}

/// 服务查询配置
///
/// 封闭的变体类型，按 `type` 字段区分；新增查询方式时扩展变体即可。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServiceConfig {
    /// 查询挂载在指定ELB上的实例
    #[serde(rename = "elb")]
    Elb { elb: ElbConfig },
    /// 按EC2过滤器搜索实例
    #[serde(rename = "search")]
    Search { search: SearchConfig },
}

/// ELB类型服务的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElbConfig {
    /// 是否只保留健康状态为 InService 的实例
    #[serde(default)]
    pub check_health: bool,
    pub name: String,
    pub region: String,
}

/// 搜索类型服务的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub region: String,
    /// 过滤器表达式列表，形如 `key|value[,value...]`
    #[serde(default)]
    pub filters: Vec<String>,
}

impl ServiceConfig {
    /// 验证单个服务配置
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ServiceConfig::Elb { elb } => {
                if elb.name.is_empty() {
                    return Err("ELB名称不能为空".into());
                }
                if elb.region.is_empty() {
                    return Err("ELB区域不能为空".into());
                }
            }
            ServiceConfig::Search { search } => {
                if search.region.is_empty() {
                    return Err("搜索区域不能为空".into());
                }
            }
        }
        Ok(())
    }
}

impl Config {
    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| AppError::config(format!("解析配置文件失败: {}", e)))?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> AppResult<()> {
        if self.polling_seconds == 0 {
            return Err(AppError::config("轮询间隔不能为0"));
        }

        if self.source.is_empty() {
            return Err(AppError::config("模板文件路径不能为空"));
        }

        if self.destination.is_empty() {
            return Err(AppError::config("输出文件路径不能为空"));
        }

        for (name, service) in &self.services {
            if let Err(e) = service.validate() {
                return Err(AppError::config(format!("服务 {} 配置无效: {}", name, e)));
            }
        }

        Ok(())
    }
}
