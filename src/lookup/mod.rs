// 实例查询模块
pub mod elb;
pub mod search;

pub use elb::ElbLookup;
pub use search::SearchLookup;

use crate::error::AppResult;
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::Reservation;
use serde::{Deserialize, Serialize};
use tracing::error;

/// 查询结果的标准化实例记录，模板写出器以此为输入
///
/// 公网/内网地址可能尚未分配，缺失不算错误。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

/// 实例查询能力接口
///
/// 返回顺序跟随AWS响应顺序，多次调用之间不保证稳定；查询内部不做重试。
#[async_trait::async_trait]
pub trait InventoryLookup: Send + Sync {
    async fn lookup(&self) -> AppResult<Vec<Instance>>;
}

/// 记录AWS错误日志，能取到服务端错误码时附带输出
pub(crate) fn log_aws_error<E, R>(err: &SdkError<E, R>)
where
    E: ProvideErrorMetadata,
{
    match err.as_service_error() {
        Some(service_err) => {
            error!(
                "AWS返回错误: {}: {}",
                service_err.code().unwrap_or("未知错误码"),
                service_err.message().unwrap_or("无详细信息")
            );
        }
        None => error!("调用AWS时发生未知错误: {}", err),
    }
}

/// 将EC2查询结果展开为实例记录列表，保留响应中的顺序
pub(crate) fn build_instance_list(reservations: &[Reservation]) -> Vec<Instance> {
    let mut instances = Vec::new();
    for reservation in reservations {
        for instance in reservation.instances() {
            instances.push(Instance {
                id: instance.instance_id().unwrap_or_default().to_string(),
                public_ip: instance.public_ip_address().map(|s| s.to_string()),
                private_ip: instance.private_ip_address().map(|s| s.to_string()),
            });
        }
    }
    instances
}
