// ==========================================
// 合规记录导入 - API 层
// ==========================================
// 职责: 提供导入 API 接口,供 CLI 及上层调用
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::ImportApi;
