use serde::{Deserialize, Serialize};

use crate::error::{Result, SegmentError};

/// `SegmentPolicy` 描述新段的容量增长策略。
///
/// # 设计初衷（Why）
/// - 单一连续数组在扩容时需要整体复制，分段结构则改为追加新段；
///   新段的尺寸决定了“分配次数”与“末段浪费”之间的平衡，因此显式暴露为可调参数。
///
/// # 增长规则（How）
/// - 首段容量为 `max(pending, initial_segment_size)`；
/// - 之后每段为 `max(pending, previous * 2)`；
/// - 两者都以 `max_segment_size` 封顶，超出上限的写入会跨越多个满额段。
///
/// # 契约说明（What）
/// - `initial_segment_size > 0`，`max_segment_size >= initial_segment_size`，否则 [`validate`](Self::validate) 报错；
/// - 支持 serde 反序列化，缺省字段回落到默认值（256 B / 1 MiB）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentPolicy {
    /// 首个段的容量（字节）。
    pub initial_segment_size: usize,
    /// 单段容量上限（字节）。
    pub max_segment_size: usize,
}

impl SegmentPolicy {
    pub const DEFAULT_INITIAL_SEGMENT_SIZE: usize = 256;
    pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 1024 * 1024;

    /// 构造并校验策略。
    pub fn new(initial_segment_size: usize, max_segment_size: usize) -> Result<Self> {
        let policy = Self {
            initial_segment_size,
            max_segment_size,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// 从 TOML 文本解析策略，例如：
    ///
    /// ```
    /// use spark_segbuf::SegmentPolicy;
    ///
    /// let policy = SegmentPolicy::from_toml_str("initial_segment_size = 64").unwrap();
    /// assert_eq!(policy.initial_segment_size, 64);
    /// assert_eq!(policy.max_segment_size, SegmentPolicy::DEFAULT_MAX_SEGMENT_SIZE);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let policy: Self = toml::from_str(text).map_err(|err| {
            SegmentError::invalid_argument(format!("malformed segment policy: {err}"))
        })?;
        policy.validate()?;
        Ok(policy)
    }

    /// 校验字段约束。
    pub fn validate(&self) -> Result<()> {
        if self.initial_segment_size == 0 {
            return Err(SegmentError::invalid_argument(
                "initial_segment_size must be greater than zero",
            ));
        }
        if self.max_segment_size < self.initial_segment_size {
            return Err(SegmentError::invalid_argument(format!(
                "max_segment_size ({}) must not be smaller than initial_segment_size ({})",
                self.max_segment_size, self.initial_segment_size
            )));
        }
        Ok(())
    }

    /// 计算下一段的容量。
    ///
    /// - `previous`：上一次分配的段容量，首段时为 `None`；
    /// - `pending`：尚未写入的字节数。
    pub fn next_capacity(&self, previous: Option<usize>, pending: usize) -> usize {
        let base = previous
            .map(|capacity| capacity.saturating_mul(2))
            .unwrap_or(self.initial_segment_size);
        base.max(pending).min(self.max_segment_size).max(1)
    }
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        Self {
            initial_segment_size: Self::DEFAULT_INITIAL_SEGMENT_SIZE,
            max_segment_size: Self::DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_doubles_until_the_cap() {
        let policy = SegmentPolicy::new(4, 16).expect("合法策略");
        assert_eq!(policy.next_capacity(None, 1), 4);
        assert_eq!(policy.next_capacity(Some(4), 1), 8);
        assert_eq!(policy.next_capacity(Some(8), 1), 16);
        assert_eq!(policy.next_capacity(Some(16), 1), 16);
    }

    #[test]
    fn pending_bytes_enlarge_segment_within_cap() {
        let policy = SegmentPolicy::new(4, 16).expect("合法策略");
        assert_eq!(policy.next_capacity(None, 10), 10);
        assert_eq!(policy.next_capacity(Some(4), 100), 16);
    }

    #[test]
    fn invalid_policies_are_rejected() {
        assert!(SegmentPolicy::new(0, 16).is_err());
        let err = SegmentPolicy::new(32, 16).expect_err("上限小于首段应报错");
        assert_eq!(err.code(), crate::error::codes::BUFFER_INVALID_ARGUMENT);
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let policy = SegmentPolicy::from_toml_str("max_segment_size = 4096").expect("解析 TOML");
        assert_eq!(
            policy.initial_segment_size,
            SegmentPolicy::DEFAULT_INITIAL_SEGMENT_SIZE
        );
        assert_eq!(policy.max_segment_size, 4096);

        assert!(SegmentPolicy::from_toml_str("initial_segment_size = \"big\"").is_err());
        assert!(SegmentPolicy::from_toml_str("initial_segment_size = 0").is_err());
    }
}
