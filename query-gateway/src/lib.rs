//! SQL 查询执行网关
//!
//! 所有 SQL 的唯一出口：
//! - 按调用打开连接（或从连接池借用），执行后保证释放
//! - 仅通过参数绑定传值
//! - 数据库未配置或执行失败时，按降级策略返回静态回退数据或错误

pub mod connector;
pub mod fallback;
pub mod gateway;
pub mod mysql;

pub use common::config::{DegradeMode, DegradePolicy};
pub use connector::{Connector, Session};
pub use fallback::FallbackDataset;
pub use gateway::QueryGateway;
pub use mysql::{MySqlConnector, MySqlPoolConnector};
