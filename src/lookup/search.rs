use super::{Instance, InventoryLookup, build_instance_list, log_aws_error};
use crate::{
    config::SearchConfig,
    error::{AppError, AppResult},
};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::types::Filter;
use tracing::warn;

/// 按EC2过滤器搜索实例
#[derive(Debug, Clone)]
pub struct SearchLookup {
    ec2_client: aws_sdk_ec2::Client,
    filters: Vec<Filter>,
}

impl SearchLookup {
    /// 按配置的区域创建搜索客户端，过滤器在此一次性解析
    pub async fn new(config: SearchConfig) -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            ec2_client: aws_sdk_ec2::Client::new(&shared_config),
            filters: create_filters(&config.filters),
        }
    }
}

/// 解析单个 `key|value[,value...]` 形式的过滤器表达式
///
/// `|` 之后是逗号分隔的值列表；缺少值的表达式无效，返回None并记录告警。
pub(crate) fn create_filter(expr: &str) -> Option<Filter> {
    let Some((name, values)) = expr.split_once('|') else {
        warn!("过滤器 '{}' 格式无效，已忽略", expr);
        return None;
    };

    let values: Vec<String> = values.split(',').map(|v| v.trim().to_string()).collect();
    Some(
        Filter::builder()
            .name(name.trim())
            .set_values(Some(values))
            .build(),
    )
}

/// 解析过滤器表达式列表，无效项丢弃，有效项保留
pub(crate) fn create_filters(exprs: &[String]) -> Vec<Filter> {
    exprs.iter().filter_map(|expr| create_filter(expr)).collect()
}

#[async_trait::async_trait]
impl InventoryLookup for SearchLookup {
    async fn lookup(&self) -> AppResult<Vec<Instance>> {
        let resp = self
            .ec2_client
            .describe_instances()
            .set_filters(Some(self.filters.clone()))
            .send()
            .await
            .map_err(|e| {
                log_aws_error(&e);
                AppError::lookup(format!("按过滤器搜索实例失败: {}", e))
            })?;

        Ok(build_instance_list(resp.reservations()))
    }
}
