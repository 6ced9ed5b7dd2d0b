//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总分段缓冲在分配、读取、参数校验三条路径上的失败语义；
//! - 纯内存结构不存在瞬时故障，所有错误对本次操作都是永久性的，原样交还调用方，内部不做重试。
//!
//! ## 设计要求（What）
//! - 错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - 每个变体对应一个稳定错误码（见 [`codes`]），遵循 `<域>.<语义>` 命名；
//! - 提供到 [`std::io::Error`] 的转换，供 `io::Read`/`io::Write` 适配层直接 `?` 传播。

use std::{collections::TryReserveError, io};

use thiserror::Error;

/// 本 crate 统一的结果别名。
pub type Result<T, E = SegmentError> = core::result::Result<T, E>;

/// 稳定错误码。
pub mod codes {
    /// 新段内存申请失败。
    pub const BUFFER_ALLOCATION_FAILED: &str = "buffer.allocation_failed";
    /// 游标在缓冲被重置或释放后仍被使用。
    pub const BUFFER_USE_AFTER_INVALIDATION: &str = "buffer.use_after_invalidation";
    /// 参数越界或配置非法。
    pub const BUFFER_INVALID_ARGUMENT: &str = "buffer.invalid_argument";
}

/// 分段缓冲错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“内存耗尽”“契约违例”“参数非法”三类失败显式区分，调用方据此决定是否终止流程；
/// - **契约 (What)**：
///   - `Allocation` 携带请求的字节数与底层 [`TryReserveError`]；
///   - `UseAfterInvalidation` 表示游标所指的段链已经不存在，属于编程错误；
///   - `InvalidArgument` 在任何状态修改之前返回，`reason` 为人类可读描述。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SegmentError {
    /// 平台无法为新段提供内存。
    #[error("failed to allocate a segment of {requested} bytes")]
    Allocation {
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    /// 游标所属缓冲已被 `reset`、重组或销毁。
    #[error("reader cursor used after its buffer was reset or released")]
    UseAfterInvalidation,

    /// 参数或配置不满足约束。
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl SegmentError {
    /// 构造参数错误的便捷入口。
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        SegmentError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            SegmentError::Allocation { .. } => codes::BUFFER_ALLOCATION_FAILED,
            SegmentError::UseAfterInvalidation => codes::BUFFER_USE_AFTER_INVALIDATION,
            SegmentError::InvalidArgument { .. } => codes::BUFFER_INVALID_ARGUMENT,
        }
    }
}

impl From<SegmentError> for io::Error {
    fn from(err: SegmentError) -> Self {
        let kind = match &err {
            SegmentError::Allocation { .. } => io::ErrorKind::OutOfMemory,
            SegmentError::UseAfterInvalidation => io::ErrorKind::NotConnected,
            SegmentError::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}
