//! 检验科后台公共模块
//!
//! 所有 crate 共享的基础设施：
//! - 配置加载（环境变量）
//! - 统一错误类型与 HTTP 映射
//! - API 响应封装
//! - 查询模型与 SQL 文本解析

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
