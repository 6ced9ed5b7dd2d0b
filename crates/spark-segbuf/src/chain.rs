use std::mem;

use bytes::Bytes;
use spin::RwLock;
use tracing::{trace, warn};

use crate::error::{Result, SegmentError};

/// 缓冲与游标共享的段链；缓冲持有唯一强引用，游标仅持有 `Weak`。
pub(crate) type Chain = RwLock<ChainState>;

/// 段链快照中的一个读位置。
///
/// `segment == sealed.len()` 表示位于末段；末段被封存后同一下标指向的内容不变。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) segment: usize,
    pub(crate) offset: usize,
    pub(crate) absolute: usize,
}

/// 段链的全部可见状态。
///
/// # 不变式
/// - `len == Σ sealed[i].len() + tail.len()`；
/// - 封存段（`Bytes`）不再被修改，只有 `tail` 存在空余容量；
/// - `tail` 永远不会超出初始容量写入，因此不会发生重新分配；
/// - `generation` 在段链被整体替换（重置、重组）时递增，游标据此识别失效。
#[derive(Debug, Default)]
pub(crate) struct ChainState {
    sealed: Vec<Bytes>,
    tail: Vec<u8>,
    len: usize,
    generation: u64,
}

impl ChainState {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// 末段剩余可写字节。
    pub(crate) fn tail_spare(&self) -> usize {
        self.tail.capacity() - self.tail.len()
    }

    /// 所有段的容量之和。
    pub(crate) fn capacity(&self) -> usize {
        self.sealed.iter().map(Bytes::len).sum::<usize>() + self.tail.capacity()
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.sealed.len() + usize::from(self.tail.capacity() > 0)
    }

    /// 若全部内容恰好位于一个封存段中，返回该段的廉价克隆。
    pub(crate) fn single_sealed(&self) -> Option<Bytes> {
        match self.sealed.as_slice() {
            [only] if self.tail.is_empty() => Some(only.clone()),
            _ => None,
        }
    }

    /// 按写入顺序遍历每个段的已用区间。
    pub(crate) fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.sealed
            .iter()
            .map(|segment| &segment[..])
            .chain(core::iter::once(self.tail.as_slice()))
            .filter(|chunk| !chunk.is_empty())
    }

    /// 发布一次写入：`head` 填入现有末段空余，`fresh` 为已在锁外填充好的新段。
    ///
    /// 调用方保证 `head.len() <= tail_spare()`，且 `fresh` 中除最后一段外均已写满。
    pub(crate) fn append(&mut self, head: &[u8], fresh: Vec<Vec<u8>>) {
        debug_assert!(head.len() <= self.tail_spare());
        self.tail.extend_from_slice(head);
        let mut written = head.len();
        for segment in fresh {
            written += segment.len();
            self.seal_tail();
            self.tail = segment;
        }
        self.len += written;
    }

    /// 用新的段链整体替换当前内容，并令既有游标失效。
    pub(crate) fn replace(&mut self, sealed: Vec<Bytes>, tail: Vec<u8>) {
        self.len = sealed.iter().map(Bytes::len).sum::<usize>() + tail.len();
        self.sealed = sealed;
        self.tail = tail;
        self.generation = self.generation.wrapping_add(1);
    }

    fn seal_tail(&mut self) {
        let tail = mem::take(&mut self.tail);
        if tail.is_empty() {
            return;
        }
        trace!(
            len = tail.len(),
            index = self.sealed.len(),
            "segment sealed"
        );
        self.sealed.push(Bytes::from(tail));
    }

    fn segment(&self, index: usize) -> Option<&[u8]> {
        match index.cmp(&self.sealed.len()) {
            core::cmp::Ordering::Less => Some(&self.sealed[index][..]),
            core::cmp::Ordering::Equal => Some(self.tail.as_slice()),
            core::cmp::Ordering::Greater => None,
        }
    }

    /// 从 `at` 起按段顺序交付至多 `limit` 字节给 `sink`，推进 `at` 并返回交付的字节数。
    ///
    /// 只访问调用时已计入 `len` 的字节；位于段尾时跨入下一个段。
    pub(crate) fn visit(
        &self,
        at: &mut Position,
        limit: usize,
        mut sink: impl FnMut(&[u8]),
    ) -> usize {
        let mut done = 0;
        while done < limit {
            let Some(segment) = self.segment(at.segment) else {
                break;
            };
            let available = segment.len() - at.offset;
            if available == 0 {
                if at.segment < self.sealed.len() {
                    at.segment += 1;
                    at.offset = 0;
                    continue;
                }
                break;
            }
            let step = available.min(limit - done);
            sink(&segment[at.offset..at.offset + step]);
            at.offset += step;
            at.absolute += step;
            done += step;
        }
        done
    }

    /// 将绝对偏移换算为段内位置；超出 `len` 时返回 `None`。
    pub(crate) fn locate(&self, absolute: usize) -> Option<Position> {
        if absolute > self.len {
            return None;
        }
        let mut at = Position::default();
        self.visit(&mut at, absolute, |_| {});
        Some(at)
    }

    /// 把全部内容复制进一块恰好 `len` 字节的连续内存。
    pub(crate) fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = allocate(self.len, "snapshot")?;
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }
}

/// 以可失败的方式申请一块容量至少为 `capacity` 的空内存，`purpose` 标注用途（段或快照）。
pub(crate) fn allocate(capacity: usize, purpose: &'static str) -> Result<Vec<u8>> {
    let mut segment = Vec::new();
    segment.try_reserve_exact(capacity).map_err(|source| {
        warn!(requested = capacity, purpose, "buffer allocation failed");
        SegmentError::Allocation {
            requested: capacity,
            source,
        }
    })?;
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    fn filled(capacity: usize, data: &[u8]) -> Vec<u8> {
        let mut segment = allocate(capacity, "segment").expect("分配测试段");
        segment.extend_from_slice(data);
        segment
    }

    #[test]
    fn append_seals_previous_tail_without_copy() {
        let mut state = ChainState::default();
        state.append(&[], vec![filled(3, b"abc"), filled(4, b"de")]);
        assert_eq!(state.len(), 5);
        assert_eq!(state.segment_count(), 2);
        assert_eq!(state.tail_spare(), 2);

        state.append(b"fg", Vec::new());
        assert_eq!(state.tail_spare(), 0);
        assert_eq!(state.to_vec().expect("快照"), b"abcdefg");
    }

    #[test]
    fn visit_crosses_segment_boundaries() {
        let mut state = ChainState::default();
        state.append(&[], vec![filled(2, b"ab"), filled(2, b"cd"), filled(4, b"e")]);
        let mut at = Position::default();
        let mut seen = Vec::new();
        let n = state.visit(&mut at, 4, |chunk| seen.extend_from_slice(chunk));
        assert_eq!(n, 4);
        assert_eq!(seen, b"abcd");
        assert_eq!(at.absolute, 4);

        let n = state.visit(&mut at, 10, |chunk| seen.extend_from_slice(chunk));
        assert_eq!(n, 1);
        assert_eq!(seen, b"abcde");
        assert_eq!(state.visit(&mut at, 10, |_| {}), 0);
    }

    #[test]
    fn locate_rejects_offsets_past_the_end() {
        let mut state = ChainState::default();
        state.append(&[], vec![filled(2, b"ab"), filled(2, b"c")]);
        let at = state.locate(2).expect("段边界是合法位置");
        assert_eq!(at.absolute, 2);
        assert!(state.locate(4).is_none());
    }

    #[test]
    fn replace_advances_generation() {
        let mut state = ChainState::default();
        let before = state.generation();
        state.replace(vec![Bytes::from_static(b"xyz")], Vec::new());
        assert_eq!(state.len(), 3);
        assert_ne!(state.generation(), before);
        assert!(state.single_sealed().is_some());
    }

    #[test]
    #[traced_test]
    fn allocation_failure_names_its_purpose() {
        let err = allocate(usize::MAX, "snapshot").expect_err("容量溢出");
        assert!(matches!(
            err,
            SegmentError::Allocation {
                requested: usize::MAX,
                ..
            }
        ));
        assert!(logs_contain("buffer allocation failed"));
        assert!(logs_contain("snapshot"));
    }
}
