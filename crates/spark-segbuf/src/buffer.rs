use std::{fmt, io, sync::Arc};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    chain::{Chain, ChainState, allocate},
    cursor::ReaderCursor,
    error::{Result, SegmentError},
    policy::SegmentPolicy,
};

/// `SegmentedBuffer` 是只追加、按段增长的内存字节缓冲。
///
/// # 设计动机（Why）
/// - 连续数组在扩容时需要整体复制已写数据；本类型改为在末段写满后追加新段，
///   已封存的段从不重新分配或复制，写入成本按字节摊还为 O(1)；
/// - 读取侧通过 [`ReaderCursor`] 逐段复制，常见的“写完即读”路径无需先拼出连续快照，
///   只有 [`to_vec`](Self::to_vec) 等显式快照操作才支付与总长成正比的复制成本。
///
/// # 架构关系（How）
/// - 段链位于 `Arc<RwLock<ChainState>>` 中：封存段为 `bytes::Bytes`，末段为容量固定的 `Vec<u8>`；
/// - 写入时先在锁外申请并填充新段，再在写锁内把剩余字节填入末段、封存、发布长度；
/// - 游标只持有 `Weak` 引用，缓冲销毁即释放全部段内存。
///
/// # 契约说明（What）
/// - **单写者**：写操作需要 `&mut self`，并发写由借用规则排除；
/// - **多读者**：任意数量的游标可并发读取，也可与写入并发，只会看到已发布的字节；
/// - `reset`、`consolidate`、`resize` 会整体替换段链，之前打开的游标全部失效。
pub struct SegmentedBuffer {
    chain: Arc<Chain>,
    policy: SegmentPolicy,
    last_capacity: Option<usize>,
}

impl SegmentedBuffer {
    /// 使用默认增长策略创建空缓冲。
    pub fn new() -> Self {
        Self::from_policy(SegmentPolicy::default())
    }

    /// 使用自定义策略创建空缓冲，策略非法时返回参数错误。
    pub fn with_policy(policy: SegmentPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self::from_policy(policy))
    }

    /// 指定首段容量，其余沿用默认策略。
    pub fn with_initial_capacity(initial_segment_size: usize) -> Result<Self> {
        let max_segment_size = initial_segment_size.max(SegmentPolicy::DEFAULT_MAX_SEGMENT_SIZE);
        Self::with_policy(SegmentPolicy::new(initial_segment_size, max_segment_size)?)
    }

    fn from_policy(policy: SegmentPolicy) -> Self {
        Self {
            chain: Arc::new(Chain::new(ChainState::default())),
            policy,
            last_capacity: None,
        }
    }

    pub fn policy(&self) -> &SegmentPolicy {
        &self.policy
    }

    /// 追加 `src` 的全部字节。
    ///
    /// # 执行步骤（How）
    /// 1. 读取末段剩余空间，切分出能直接写入末段的前缀；
    /// 2. 在锁外按增长策略申请新段并填入其余字节，任何一次申请失败都会在修改段链前返回；
    /// 3. 持写锁把前缀填入末段，依次封存并挂上新段，最后发布新长度。
    ///
    /// # 错误
    /// - [`SegmentError::Allocation`]：新段申请失败，缓冲内容保持不变。
    pub fn write(&mut self, src: &[u8]) -> Result<()> {
        if src.is_empty() {
            return Ok(());
        }
        let spare = self.chain.read().tail_spare();
        let (head, rest) = src.split_at(spare.min(src.len()));
        let fresh = self.fill_segments(rest)?;
        self.chain.write().append(head, fresh);
        Ok(())
    }

    /// 追加单个字节。
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    fn fill_segments(&mut self, mut rest: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut fresh = Vec::new();
        let mut previous = self.last_capacity;
        while !rest.is_empty() {
            let capacity = self.policy.next_capacity(previous, rest.len());
            let mut segment = allocate(capacity, "segment")?;
            trace!(capacity = segment.capacity(), "segment allocated");
            let (now, later) = rest.split_at(segment.capacity().min(rest.len()));
            segment.extend_from_slice(now);
            rest = later;
            previous = Some(segment.capacity());
            fresh.push(segment);
        }
        self.last_capacity = previous;
        Ok(fresh)
    }

    /// 已写入的总字节数。
    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 所有段的容量之和（含末段空余）。
    pub fn capacity(&self) -> usize {
        self.chain.read().capacity()
    }

    pub fn segment_count(&self) -> usize {
        self.chain.read().segment_count()
    }

    /// 打开一个位于起点的新游标，不复制任何数据。
    pub fn open_reader(&self) -> ReaderCursor {
        ReaderCursor::new(&self.chain)
    }

    /// 把全部内容按写入顺序复制进一块新的连续内存。
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.chain.read().to_vec()
    }

    /// 返回连续快照；内容恰好位于单个封存段时直接共享该段。
    pub fn to_bytes(&self) -> Result<Bytes> {
        let state = self.chain.read();
        if let Some(only) = state.single_sealed() {
            return Ok(only);
        }
        state.to_vec().map(Bytes::from)
    }

    /// 以 UTF-8 解码全部内容，非法序列替换为 `U+FFFD`。
    pub fn to_string_lossy(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.to_vec()?).into_owned())
    }

    /// 按段把内容写入 `out`，不构造连续副本。
    pub fn write_to<W: io::Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let state = self.chain.read();
        for chunk in state.chunks() {
            out.write_all(chunk)?;
        }
        Ok(())
    }

    /// 丢弃所有段，回到空状态；之前打开的游标全部失效。
    pub fn reset(&mut self) {
        let mut state = self.chain.write();
        debug!(len = state.len(), segments = state.segment_count(), "buffer reset");
        state.replace(Vec::new(), Vec::new());
        self.last_capacity = None;
    }

    /// 把所有段合并为一个长度恰为 `len()` 的封存段并返回它。
    ///
    /// 缓冲为空或段链已是单一封存段时直接返回，游标不受影响；否则段链被替换，之前的游标全部失效。
    pub fn consolidate(&mut self) -> Result<Bytes> {
        let merged = {
            let state = self.chain.read();
            if state.len() == 0 {
                return Ok(Bytes::new());
            }
            if let Some(only) = state.single_sealed() {
                return Ok(only);
            }
            Bytes::from(state.to_vec()?)
        };
        let mut state = self.chain.write();
        debug!(
            len = merged.len(),
            segments = state.segment_count(),
            "buffer consolidated"
        );
        state.replace(vec![merged.clone()], Vec::new());
        self.last_capacity = Some(merged.len());
        Ok(merged)
    }

    /// 以容量为 `target_capacity` 的单个可写段承载当前内容；之前的游标全部失效。
    ///
    /// # 错误
    /// - [`SegmentError::InvalidArgument`]：`target_capacity < len()`，缓冲保持不变；
    /// - [`SegmentError::Allocation`]：目标段申请失败，缓冲保持不变。
    pub fn resize(&mut self, target_capacity: usize) -> Result<()> {
        let tail = {
            let state = self.chain.read();
            if target_capacity < state.len() {
                return Err(SegmentError::invalid_argument(format!(
                    "target capacity {target_capacity} is smaller than buffer length {}",
                    state.len()
                )));
            }
            let mut tail = allocate(target_capacity, "segment")?;
            for chunk in state.chunks() {
                tail.extend_from_slice(chunk);
            }
            tail
        };
        let mut state = self.chain.write();
        debug!(
            capacity = tail.capacity(),
            len = tail.len(),
            "buffer resized"
        );
        self.last_capacity = (tail.capacity() > 0).then_some(tail.capacity());
        state.replace(Vec::new(), tail);
        Ok(())
    }
}

impl Default for SegmentedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SegmentedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.chain.read();
        f.debug_struct("SegmentedBuffer")
            .field("len", &state.len())
            .field("segments", &state.segment_count())
            .field("policy", &self.policy)
            .finish()
    }
}

impl io::Write for SegmentedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        SegmentedBuffer::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
