// 服务层模块
pub mod executor;
pub mod poller;
pub mod writer;

pub use executor::{TaskStatus, execute_task};
pub use poller::Poller;
pub use writer::TemplateWriter;
