#![deny(unsafe_code)]

//! `spark-segbuf` 提供分段追加、免拷贝读取的内存字节缓冲。
//!
//! # 模块定位（Why）
//! - 连续数组式的输出缓冲在增长时反复复制已写数据，读取前还要再拷贝出一份完整数组；
//!   本 crate 以段链替代连续数组，写入只追加新段，读取通过游标逐段进行。
//! - 仅承担进程内、纯内存的缓冲职责：不涉及持久化、压缩或任何传输。
//!
//! # 设计概要（How）
//! - [`SegmentedBuffer`]：唯一写者，按 [`SegmentPolicy`] 增长，封存段以 `bytes::Bytes` 保存，永不修改；
//! - [`ReaderCursor`]：独立读位置，仅弱引用段链，支持 `mark`/`reset_to_mark`、跳过、定位与摘要更新；
//! - [`SegmentError`]：分配失败、游标失效、参数非法三类错误，附稳定错误码。
//!
//! # 使用示例
//! ```
//! use std::io::Read;
//!
//! use spark_segbuf::SegmentedBuffer;
//!
//! let mut buffer = SegmentedBuffer::new();
//! buffer.write(&[0x01, 0x02, 0x03]).unwrap();
//! buffer.write(&[0x04, 0x05]).unwrap();
//! assert_eq!(buffer.len(), 5);
//!
//! let mut out = Vec::new();
//! Read::read_to_end(&mut buffer.open_reader(), &mut out).unwrap();
//! assert_eq!(out, buffer.to_vec().unwrap());
//! ```
//!
//! # 并发约定
//! - 写入需要 `&mut SegmentedBuffer`，同一时刻只有一个写者；
//! - 游标可跨线程移动并与写入并发，每次读取只看到调用时已发布的字节；
//! - 内部仅用一把 `spin::RwLock` 保护段链元数据的发布，不提供额外的“同步模式”。

mod buffer;
mod chain;
mod cursor;
mod error;
mod policy;

pub use buffer::SegmentedBuffer;
pub use cursor::ReaderCursor;
pub use error::{Result, SegmentError, codes};
pub use policy::SegmentPolicy;
