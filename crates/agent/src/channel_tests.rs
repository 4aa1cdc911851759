// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::io::AsyncWriteExt;

use super::*;
use crate::frame::RequestKind;

fn pair() -> (
    FramedChannel<tokio::io::DuplexStream, tokio::io::DuplexStream>,
    FramedChannel<tokio::io::DuplexStream, tokio::io::DuplexStream>,
) {
    let (a_in, b_out) = tokio::io::duplex(4096);
    let (b_in, a_out) = tokio::io::duplex(4096);
    (FramedChannel::new(a_in, a_out), FramedChannel::new(b_in, b_out))
}

#[tokio::test]
async fn send_recv_round_trip() -> Result<(), AgentError> {
    let (mut client, mut agent) = pair();

    let mut frame = Frame::new(RequestKind::Skip);
    frame.set_num(12345);
    client.send(&frame).await?;

    let received = agent.recv().await?;
    assert_eq!(received.request(), Some(RequestKind::Skip));
    assert_eq!(received.num_arg, 12345);
    Ok(())
}

#[tokio::test]
async fn recv_reassembles_split_frames() -> Result<(), AgentError> {
    let (reader, mut raw_writer) = tokio::io::duplex(4096);
    let (_unused_r, unused_w) = tokio::io::duplex(16);
    let mut channel = FramedChannel::new(reader, unused_w);

    let mut first = Frame::new(RequestKind::FlagGet);
    first.set_int(1, 2);
    let mut second = Frame::new(RequestKind::GetNum);
    second.set_num(99);

    let mut wire = first.encode();
    wire.extend_from_slice(&second.encode());

    // Drip the two frames through deliberately misaligned writes.
    let writer = tokio::spawn(async move {
        for chunk in wire.chunks(61) {
            raw_writer.write_all(chunk).await.map_err(|_| AgentError::Disconnected)?;
            raw_writer.flush().await.map_err(|_| AgentError::Disconnected)?;
        }
        Ok::<_, AgentError>(raw_writer)
    });

    let one = channel.recv().await?;
    let two = channel.recv().await?;
    assert_eq!(one.request(), Some(RequestKind::FlagGet));
    assert_eq!(one.int_arg, 1);
    assert_eq!(two.request(), Some(RequestKind::GetNum));
    assert_eq!(two.num_arg, 99);
    drop(writer);
    Ok(())
}

#[tokio::test]
async fn eof_is_disconnected() {
    let (mut client, agent) = pair();
    drop(agent);
    assert_eq!(client.recv().await.map(|_| ()), Err(AgentError::Disconnected));
}

#[tokio::test]
async fn partial_frame_then_eof_is_disconnected() {
    let (reader, mut writer) = tokio::io::duplex(4096);
    let (_unused_r, unused_w) = tokio::io::duplex(16);
    let mut channel = FramedChannel::new(reader, unused_w);

    let frame = Frame::new(RequestKind::Init);
    let encoded = frame.encode();
    writer.write_all(&encoded[..FRAME_LEN / 2]).await.ok();
    drop(writer);

    assert_eq!(channel.recv().await.map(|_| ()), Err(AgentError::Disconnected));
}

#[tokio::test]
async fn version_mismatch_is_fatal() {
    let (mut client, mut agent) = pair();

    let mut frame = Frame::new(RequestKind::Init);
    frame.protocol_version = 0xDEAD;
    agent.send(&frame).await.ok();

    assert_eq!(client.recv().await.map(|_| ()), Err(AgentError::ProtocolMismatch));
}

#[tokio::test]
async fn wait_ready_times_out_on_silence() {
    let (mut client, _agent) = pair();
    let result = client.wait_ready(Duration::from_millis(20)).await;
    assert_eq!(result, Err(AgentError::Timeout));
}

#[tokio::test]
async fn wait_ready_sees_buffered_byte() -> Result<(), AgentError> {
    let (mut client, mut agent) = pair();
    agent.send(&Frame::new(RequestKind::Init)).await?;

    client.wait_ready(Duration::from_millis(100)).await?;
    // The byte consumed by wait_ready must still be part of the frame.
    let frame = client.recv().await?;
    assert_eq!(frame.request(), Some(RequestKind::Init));
    Ok(())
}

mod reassembly {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    proptest! {
        /// recv() must reassemble frames regardless of how the wire slices
        /// them into reads.
        #[test]
        fn chunk_boundaries_never_corrupt_frames(
            chunk in 1usize..(2 * FRAME_LEN),
            nums in proptest::collection::vec(any::<u128>(), 1..5),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            rt.block_on(async {
                let (reader, mut writer) = tokio::io::duplex(8 * FRAME_LEN);
                let (_unused_r, unused_w) = tokio::io::duplex(16);
                let mut channel = FramedChannel::new(reader, unused_w);

                let mut wire = Vec::new();
                for num in &nums {
                    let mut frame = Frame::new(RequestKind::GetNum);
                    frame.set_num(*num);
                    wire.extend_from_slice(&frame.encode());
                }

                let chunks: Vec<Vec<u8>> = wire.chunks(chunk).map(<[u8]>::to_vec).collect();
                let writer_task = tokio::spawn(async move {
                    for piece in chunks {
                        if writer.write_all(&piece).await.is_err() {
                            return;
                        }
                    }
                });

                for num in &nums {
                    let frame = channel.recv().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                    prop_assert_eq!(frame.num_arg, *num);
                }
                writer_task.await.ok();
                Ok::<_, TestCaseError>(())
            })?;
        }
    }
}
