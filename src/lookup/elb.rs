use super::{Instance, InventoryLookup, build_instance_list, log_aws_error};
use crate::{
    config::ElbConfig,
    error::{AppError, AppResult},
};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_elasticloadbalancing::types::InstanceState;
use tracing::debug;

/// 查询挂载在指定ELB上的实例
#[derive(Debug, Clone)]
pub struct ElbLookup {
    config: ElbConfig,
    ec2_client: aws_sdk_ec2::Client,
    elb_client: aws_sdk_elasticloadbalancing::Client,
}

impl ElbLookup {
    /// 按配置的区域创建ELB查询客户端
    pub async fn new(config: ElbConfig) -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Self {
            ec2_client: aws_sdk_ec2::Client::new(&shared_config),
            elb_client: aws_sdk_elasticloadbalancing::Client::new(&shared_config),
            config,
        }
    }
}

/// 根据健康状态筛选实例ID
///
/// check_health开启时只保留状态恰好为 InService 的成员，否则全部保留。
pub(crate) fn healthy_instance_ids(states: &[InstanceState], check_health: bool) -> Vec<String> {
    states
        .iter()
        .filter(|state| !check_health || state.state() == Some("InService"))
        .filter_map(|state| state.instance_id().map(|id| id.to_string()))
        .collect()
}

#[async_trait::async_trait]
impl InventoryLookup for ElbLookup {
    async fn lookup(&self) -> AppResult<Vec<Instance>> {
        let output = self
            .elb_client
            .describe_instance_health()
            .load_balancer_name(&self.config.name)
            .send()
            .await
            .map_err(|e| {
                log_aws_error(&e);
                AppError::lookup(format!("查询ELB {} 实例健康状态失败: {}", self.config.name, e))
            })?;

        let instance_ids = healthy_instance_ids(output.instance_states(), self.config.check_health);
        debug!("ELB {} 下有 {} 个符合条件的实例", self.config.name, instance_ids.len());
        if instance_ids.is_empty() {
            // 空ID列表的DescribeInstances会返回全部实例，这里直接短路
            return Ok(Vec::new());
        }

        let resp = self
            .ec2_client
            .describe_instances()
            .set_instance_ids(Some(instance_ids))
            .send()
            .await
            .map_err(|e| {
                log_aws_error(&e);
                AppError::lookup(format!("查询ELB {} 成员实例详情失败: {}", self.config.name, e))
            })?;

        Ok(build_instance_list(resp.reservations()))
    }
}
