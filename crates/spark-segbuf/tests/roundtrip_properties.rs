//! 分段缓冲的性质测试。
//!
//! - 任意分块写入后，连续快照与游标读取都等于按调用顺序拼接的写入内容；
//! - 两个游标以任意步长交错读取，互不影响；
//! - `mark` 之后读 M 字节再回退，重读结果一致。

use proptest::prelude::*;
use spark_segbuf::{SegmentPolicy, SegmentedBuffer};

fn policies() -> impl Strategy<Value = SegmentPolicy> {
    (1usize..32, 0usize..64).prop_map(|(initial, extra)| {
        SegmentPolicy::new(initial, initial + extra).expect("生成的策略始终合法")
    })
}

fn chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..48), 0..24)
}

fn build(policy: SegmentPolicy, chunks: &[Vec<u8>]) -> (SegmentedBuffer, Vec<u8>) {
    let mut buffer = SegmentedBuffer::with_policy(policy).expect("创建缓冲");
    let mut expected = Vec::new();
    for chunk in chunks {
        buffer.write(chunk).expect("写入");
        expected.extend_from_slice(chunk);
    }
    (buffer, expected)
}

proptest! {
    #[test]
    fn prop_snapshot_and_cursor_match_concatenation(policy in policies(), chunks in chunks()) {
        let (buffer, expected) = build(policy, &chunks);
        prop_assert_eq!(buffer.len(), expected.len());
        prop_assert_eq!(buffer.to_vec().expect("快照"), expected.clone());

        let mut cursor = buffer.open_reader();
        let mut out = Vec::new();
        let mut scratch = [0u8; 11];
        loop {
            let n = cursor.read(&mut scratch).expect("读取");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&scratch[..n]);
        }
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn prop_cursors_interleave_independently(
        policy in policies(),
        chunks in chunks(),
        steps in prop::collection::vec((any::<bool>(), 1usize..20), 1..64),
    ) {
        let (buffer, expected) = build(policy, &chunks);
        let mut cursors = [buffer.open_reader(), buffer.open_reader()];
        let mut outputs = [Vec::new(), Vec::new()];
        let mut scratch = [0u8; 20];
        for (pick_second, len) in steps.iter().copied().cycle().take(expected.len() * 2 + 64) {
            let index = usize::from(pick_second);
            let n = cursors[index].read(&mut scratch[..len]).expect("读取");
            outputs[index].extend_from_slice(&scratch[..n]);
        }
        for (cursor, output) in cursors.iter_mut().zip(outputs.iter_mut()) {
            cursor.read_to_end(output).expect("读完剩余");
            prop_assert_eq!(&output[..], &expected[..]);
        }
    }

    #[test]
    fn prop_mark_then_reset_replays(
        policy in policies(),
        chunks in chunks(),
        skip in 0usize..200,
        take in 0usize..200,
    ) {
        let (buffer, expected) = build(policy, &chunks);
        let mut cursor = buffer.open_reader();
        let skipped = cursor.skip(skip).expect("跳过");
        prop_assert_eq!(skipped, skip.min(expected.len()));
        cursor.mark().expect("标记");

        let mut first = vec![0u8; take];
        let n = cursor.read(&mut first).expect("首次读取");
        cursor.reset_to_mark().expect("回退");
        let mut second = vec![0u8; take];
        let m = cursor.read(&mut second).expect("再次读取");
        prop_assert_eq!(n, m);
        prop_assert_eq!(&first[..n], &second[..m]);
        prop_assert_eq!(&first[..n], &expected[skipped..skipped + n]);
    }
}
