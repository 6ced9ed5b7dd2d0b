use std::{
    io,
    sync::{Arc, Weak},
};

use sha2::Digest;
use tracing::trace;

use crate::{
    chain::{Chain, ChainState, Position},
    error::{Result, SegmentError},
};

/// `ReaderCursor` 是段链上的独立读位置。
///
/// # 设计动机（Why）
/// - 读取累积字节时不必先拼出一块连续数组：游标直接按段遍历，逐段复制到调用方提供的切片；
/// - 多个游标互不干扰，各自维护 `(段下标, 段内偏移)`，可在不同线程并行读取。
///
/// # 架构关系（How）
/// - 只持有段链的 `Weak` 引用，缓冲销毁后段内存随即释放，游标随之失效；
/// - 打开时记录段链的 `generation`，缓冲 `reset`/`consolidate`/`resize` 后代数变化，游标进入失效态；
/// - 每次读取在读锁下进行，只能看到调用时已发布的字节（先写后发布）。
///
/// # 契约说明（What）
/// - 状态机：`Active` → `Invalidated`，失效后所有操作返回 [`SegmentError::UseAfterInvalidation`]；
/// - `read` 返回 0 表示读到当前数据末尾；之后若缓冲继续写入，同一游标可以接着读；
/// - `mark`/`reset_to_mark` 支持回读，默认标记位于起点。
#[derive(Clone, Debug)]
pub struct ReaderCursor {
    chain: Weak<Chain>,
    generation: u64,
    at: Position,
    mark: Position,
}

impl ReaderCursor {
    pub(crate) fn new(chain: &Arc<Chain>) -> Self {
        let generation = chain.read().generation();
        Self {
            chain: Arc::downgrade(chain),
            generation,
            at: Position::default(),
            mark: Position::default(),
        }
    }

    /// 在读锁下访问段链，先确认游标仍然有效。
    fn with_state<R>(&self, f: impl FnOnce(&ChainState) -> R) -> Result<R> {
        let Some(chain) = self.chain.upgrade() else {
            trace!("reader cursor used after buffer release");
            return Err(SegmentError::UseAfterInvalidation);
        };
        let state = chain.read();
        if state.generation() != self.generation {
            trace!(
                opened = self.generation,
                current = state.generation(),
                "reader cursor used after buffer reset"
            );
            return Err(SegmentError::UseAfterInvalidation);
        }
        Ok(f(&state))
    }

    /// 游标是否仍处于可用状态。
    pub fn is_valid(&self) -> bool {
        self.with_state(|_| ()).is_ok()
    }

    /// 复制至多 `dst.len()` 字节到 `dst`，返回实际复制的字节数；0 表示暂无更多数据。
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
        let mut at = self.at;
        let copied = self.with_state(|state| {
            let mut filled = 0;
            state.visit(&mut at, dst.len(), |chunk| {
                dst[filled..filled + chunk.len()].copy_from_slice(chunk);
                filled += chunk.len();
            })
        })?;
        self.at = at;
        Ok(copied)
    }

    /// 读取单个字节，数据末尾返回 `None`。
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok((self.read(&mut byte)? == 1).then_some(byte[0]))
    }

    /// 把剩余全部字节追加到 `out`，返回追加的字节数。
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut at = self.at;
        let appended = self.with_state(|state| -> Result<usize> {
            let pending = state.len() - at.absolute;
            out.try_reserve(pending)
                .map_err(|source| SegmentError::Allocation {
                    requested: pending,
                    source,
                })?;
            Ok(state.visit(&mut at, pending, |chunk| out.extend_from_slice(chunk)))
        })??;
        self.at = at;
        Ok(appended)
    }

    /// 跳过至多 `n` 字节，返回实际跳过的字节数（不会越过当前数据末尾）。
    pub fn skip(&mut self, n: usize) -> Result<usize> {
        let mut at = self.at;
        let skipped = self.with_state(|state| state.visit(&mut at, n, |_| {}))?;
        self.at = at;
        Ok(skipped)
    }

    /// 移动到绝对位置 `position`；超出当前长度时返回参数错误且位置不变。
    pub fn seek(&mut self, position: usize) -> Result<()> {
        let located = self.with_state(|state| (state.locate(position), state.len()))?;
        match located {
            (Some(at), _) => {
                self.at = at;
                Ok(())
            }
            (None, len) => Err(SegmentError::invalid_argument(format!(
                "seek position {position} is beyond buffer length {len}"
            ))),
        }
    }

    /// 当前绝对读位置。
    pub fn position(&self) -> Result<usize> {
        self.with_state(|_| self.at.absolute)
    }

    /// 以调用时的缓冲长度计算的剩余可读字节。
    pub fn remaining(&self) -> Result<usize> {
        self.with_state(|state| state.len() - self.at.absolute)
    }

    /// 记录当前位置，供 [`reset_to_mark`](Self::reset_to_mark) 回退。
    pub fn mark(&mut self) -> Result<()> {
        self.with_state(|_| ())?;
        self.mark = self.at;
        Ok(())
    }

    /// 回到最近一次标记的位置；未标记时回到起点。
    pub fn reset_to_mark(&mut self) -> Result<()> {
        self.with_state(|_| ())?;
        self.at = self.mark;
        Ok(())
    }

    /// 将至多 `limit` 字节（`None` 为全部剩余）喂给摘要并推进游标，返回消费的字节数。
    ///
    /// ```
    /// use sha2::{Digest, Sha256};
    /// use spark_segbuf::SegmentedBuffer;
    ///
    /// let mut buffer = SegmentedBuffer::new();
    /// buffer.write(b"hello world").unwrap();
    /// let mut digest = Sha256::new();
    /// buffer.open_reader().update_digest(&mut digest, None).unwrap();
    /// assert_eq!(digest.finalize(), Sha256::digest(b"hello world"));
    /// ```
    pub fn update_digest<D: Digest>(
        &mut self,
        digest: &mut D,
        limit: Option<usize>,
    ) -> Result<usize> {
        let mut at = self.at;
        let consumed = self.with_state(|state| {
            let pending = state.len() - at.absolute;
            let limit = limit.map_or(pending, |limit| limit.min(pending));
            state.visit(&mut at, limit, |chunk| digest.update(chunk))
        })?;
        self.at = at;
        Ok(consumed)
    }
}

impl io::Read for ReaderCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        ReaderCursor::read(self, buf).map_err(io::Error::from)
    }
}
