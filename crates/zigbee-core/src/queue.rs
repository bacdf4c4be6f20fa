//! Per-endpoint pending request queue
//!
//! Requests for a sleepy endpoint wait here until the device checks in.
//! At most one transmission per endpoint is on the wire at any time.

use crate::adapter::{Adapter, Destination, TransmitOptions};
use crate::error::{AdapterError, ZclError};
use crate::request::{CoalescePolicy, PendingRequest};
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

/// Caller side of a queued request
pub type Receiver = oneshot::Receiver<Result<Option<Bytes>, ZclError>>;

/// Ordered queue of requests for one endpoint
#[derive(Debug, Default)]
pub struct EndpointQueue {
    entries: Mutex<VecDeque<PendingRequest>>,
    /// Held for the duration of one transmission
    wire: Mutex<()>,
}

impl EndpointQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Whether any entry waits for fast poll
    pub async fn has_bulk(&self) -> bool {
        self.entries.lock().await.iter().any(PendingRequest::is_bulk)
    }

    /// Add a request, merging it with queued ones where allowed
    ///
    /// An identical queued request is replaced by the new one, which takes
    /// over its callers and moves to the back of the queue.
    pub async fn enqueue(&self, mut request: PendingRequest) {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, Instant::now());
        let policy = request.frame.coalesce_policy();

        if policy != CoalescePolicy::None {
            if let Some(index) = entries
                .iter()
                .position(|e| e.frame.same_request(&request.frame))
            {
                if let Some(older) = entries.remove(index) {
                    tracing::debug!(
                        "Merging {} with queued request ({} callers)",
                        request.frame.describe(),
                        older.callers()
                    );
                    request.adopt(older);
                }
            }
        }

        if policy == CoalescePolicy::KeepCommand {
            let ids = request.frame.attribute_ids();
            let mut i = 0;
            while i < entries.len() {
                let entry = &mut entries[i];
                if entry.frame.coalesce_policy() == CoalescePolicy::KeepCommand
                    && entry.frame.same_command(&request.frame)
                    && entry.frame.remove_attributes(&ids) == 0
                {
                    if let Some(superseded) = entries.remove(i) {
                        tracing::debug!(
                            "Queued {} superseded by newer write",
                            superseded.frame.describe()
                        );
                        superseded.reject(ZclError::Superseded);
                    }
                    continue;
                }
                i += 1;
            }
        }

        tracing::debug!(
            "Queued {} for {:#06x}/{} ({:?})",
            request.frame.describe(),
            request.destination.nwk_address,
            request.destination.endpoint,
            request.send_policy
        );
        entries.push_back(request);
    }

    /// Transmit one frame, waiting for the wire
    pub async fn transmit(
        &self,
        adapter: &dyn Adapter,
        destination: Destination,
        frame: Bytes,
        options: &TransmitOptions,
    ) -> Result<Option<Bytes>, AdapterError> {
        let _wire = self.wire.lock().await;
        match tokio::time::timeout(options.timeout, adapter.transmit(destination, frame, options))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout),
        }
    }

    /// Take the next entry eligible for a drain, rejecting expired ones
    async fn next_entry(&self, fast_poll: bool) -> Option<PendingRequest> {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, Instant::now());
        let index = entries.iter().position(|e| fast_poll || !e.is_bulk())?;
        entries.remove(index)
    }

    /// Reject entries that outlived their residency
    pub async fn expire(&self) -> usize {
        purge_expired(&mut *self.entries.lock().await, Instant::now())
    }

    /// Earliest expiry among queued entries
    pub async fn next_deadline(&self) -> Option<Instant> {
        self.entries.lock().await.iter().map(|e| e.expires_at).min()
    }

    /// Wait for a queued request to complete
    ///
    /// Expired entries are rejected when their deadline passes, whether or
    /// not the device checks in. A caller merged into a newer request waits
    /// for that request's deadline instead of its own.
    pub async fn wait(
        &self,
        mut completion: Receiver,
        deadline: Instant,
    ) -> Result<Option<Bytes>, ZclError> {
        let mut deadline = Some(deadline);
        loop {
            let Some(at) = deadline else {
                return completion.await.unwrap_or(Err(ZclError::Stopping));
            };
            match tokio::time::timeout_at(at, &mut completion).await {
                Ok(result) => return result.unwrap_or(Err(ZclError::Stopping)),
                Err(_) => {
                    self.expire().await;
                    // None means the entry is on the wire or already done
                    deadline = self.next_deadline().await;
                }
            }
        }
    }

    /// Send queued entries in order, one at a time
    ///
    /// Bulk entries are only sent when `fast_poll` is set. A failed entry
    /// rejects its callers and the drain moves on, except for fatal adapter
    /// errors which stop it.
    pub async fn drain(&self, adapter: &dyn Adapter, fast_poll: bool) -> Result<usize, AdapterError> {
        let mut sent = 0;
        while let Some(request) = self.next_entry(fast_poll).await {
            let frame = match request.frame.to_bytes() {
                Ok(frame) => frame,
                Err(e) => {
                    request.reject(e.into());
                    continue;
                }
            };
            match self
                .transmit(adapter, request.destination, frame, &request.options)
                .await
            {
                Ok(response) => {
                    sent += 1;
                    request.resolve(response);
                }
                Err(e) if e.is_fatal() => {
                    request.reject(ZclError::Transport(e.clone()));
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Queued {} failed: {}", request.frame.describe(), e);
                    request.reject(ZclError::Transport(e));
                }
            }
        }
        Ok(sent)
    }

    /// Reject every queued entry
    pub async fn flush(&self, error: ZclError) -> usize {
        let flushed: Vec<PendingRequest> = self.entries.lock().await.drain(..).collect();
        let count = flushed.len();
        for request in flushed {
            request.reject(error.clone());
        }
        count
    }
}

/// Remove and reject expired entries, returning how many were dropped
fn purge_expired(entries: &mut VecDeque<PendingRequest>, now: Instant) -> usize {
    let (expired, fresh): (VecDeque<_>, VecDeque<_>) =
        entries.drain(..).partition(|e| e.is_expired(now));
    *entries = fresh;
    let count = expired.len();
    for request in expired {
        tracing::debug!(
            "Dropping expired {} (queued {:?} ago)",
            request.frame.describe(),
            now - request.created_at
        );
        request.reject(ZclError::Expired);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{OutgoingFrame, SendPolicy};
    use crate::testing::MockAdapter;
    use std::time::Duration;
    use zcl_protocol::{
        ClusterRegistry, Direction, Fields, FrameType, GlobalCommand, Payload, ZclFrame, ZclHeader,
    };

    const DESTINATION: Destination = Destination {
        nwk_address: 0x1234,
        endpoint: 1,
    };

    fn frame(command: GlobalCommand, tsn: u8, records: Vec<Fields>) -> OutgoingFrame {
        OutgoingFrame::Zcl(ZclFrame::new(
            ZclHeader {
                frame_type: FrameType::Global,
                direction: Direction::ClientToServer,
                disable_default_response: true,
                manufacturer_code: None,
                transaction_sequence_number: tsn,
                command_id: command as u8,
            },
            ClusterRegistry::builtin().by_id(0x0006, None),
            Payload::Records(records),
        ))
    }

    fn write(tsn: u8, attributes: &[(u16, u16)]) -> OutgoingFrame {
        let records = attributes
            .iter()
            .map(|(id, value)| {
                Fields::new()
                    .with("attrId", *id)
                    .with("dataType", 0x21u8)
                    .with("attrData", *value)
            })
            .collect();
        frame(GlobalCommand::WriteAttributes, tsn, records)
    }

    fn read(tsn: u8, ids: &[u16]) -> OutgoingFrame {
        let records = ids.iter().map(|id| Fields::new().with("attrId", *id)).collect();
        frame(GlobalCommand::ReadAttributes, tsn, records)
    }

    fn pending(frame: OutgoingFrame, policy: SendPolicy) -> (PendingRequest, Receiver) {
        let (tx, rx) = oneshot::channel();
        let options = TransmitOptions::new(frame.cluster_id(), 1);
        let request = PendingRequest::new(
            frame,
            DESTINATION,
            options,
            policy,
            Duration::from_secs(60),
            tx,
        );
        (request, rx)
    }

    #[tokio::test]
    async fn test_overlapping_writes_keep_partitions() {
        let adapter = MockAdapter::new();
        let queue = EndpointQueue::new();
        let (first, first_rx) = pending(write(1, &[(0x4001, 10), (0x4002, 20)]), SendPolicy::Queue);
        let (second, _second_rx) = pending(write(2, &[(0x4001, 11)]), SendPolicy::Queue);
        queue.enqueue(first).await;
        queue.enqueue(second).await;
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.drain(adapter.as_ref(), false).await, Ok(2));
        let sent = adapter.sent();
        let attrs: Vec<Vec<u64>> = sent
            .iter()
            .map(|s| OutgoingFrame::Zcl(s.decode()).attribute_ids())
            .collect();
        assert_eq!(attrs, vec![vec![0x4002], vec![0x4001]]);
        // Only the newest value of the overlapping attribute is sent
        let Payload::Records(records) = &sent[1].decode().payload else {
            panic!("expected records");
        };
        assert_eq!(records[0].get("attrData").and_then(|v| v.as_u64()), Some(11));
        assert_eq!(first_rx.await.unwrap(), Ok(None));
    }

    #[tokio::test]
    async fn test_fully_superseded_write_is_rejected() {
        let queue = EndpointQueue::new();
        let (first, first_rx) = pending(write(1, &[(0x4001, 10)]), SendPolicy::Queue);
        let (second, _) = pending(write(2, &[(0x4001, 11), (0x4002, 5)]), SendPolicy::Queue);
        queue.enqueue(first).await;
        queue.enqueue(second).await;
        assert_eq!(queue.len().await, 1);
        assert_eq!(first_rx.await.unwrap(), Err(ZclError::Superseded));
    }

    #[tokio::test]
    async fn test_identical_write_attaches() {
        let adapter = MockAdapter::new();
        let queue = EndpointQueue::new();
        let (first, first_rx) = pending(write(1, &[(0x4001, 10)]), SendPolicy::Queue);
        let (second, second_rx) = pending(write(2, &[(0x4001, 10)]), SendPolicy::Queue);
        queue.enqueue(first).await;
        queue.enqueue(second).await;
        assert_eq!(queue.len().await, 1);

        queue.drain(adapter.as_ref(), false).await.unwrap();
        assert_eq!(adapter.sent().len(), 1);
        assert_eq!(first_rx.await.unwrap(), Ok(None));
        assert_eq!(second_rx.await.unwrap(), Ok(None));
    }

    #[tokio::test]
    async fn test_identical_reads_share_one_transmission() {
        let adapter = MockAdapter::new();
        adapter.reply(Ok(None));
        adapter.reply_frame(&[0x18, 0x02, 0x01, 0x00, 0x00, 0x00, 0x10, 0x01]);
        let queue = EndpointQueue::new();
        let (first, first_rx) = pending(read(1, &[0x0000]), SendPolicy::Queue);
        let (second, second_rx) = pending(read(2, &[0x0000]), SendPolicy::Queue);
        let (other, _) = pending(read(3, &[0x4003]), SendPolicy::Queue);
        queue.enqueue(first).await;
        queue.enqueue(second).await;
        queue.enqueue(other).await;
        assert_eq!(queue.len().await, 2);

        queue.drain(adapter.as_ref(), false).await.unwrap();
        // The merged read moved behind the other one
        let sent = adapter.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].decode().header.transaction_sequence_number, 3);
        assert_eq!(sent[1].decode().header.transaction_sequence_number, 2);
        let a = first_rx.await.unwrap().unwrap();
        let b = second_rx.await.unwrap().unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_undivided_writes_never_coalesce() {
        let queue = EndpointQueue::new();
        let undiv = |tsn| {
            let mut f = write(tsn, &[(0x4001, 10)]);
            if let OutgoingFrame::Zcl(frame) = &mut f {
                frame.header.command_id = GlobalCommand::WriteAttributesUndivided as u8;
            }
            f
        };
        queue.enqueue(pending(undiv(1), SendPolicy::Queue).0).await;
        queue.enqueue(pending(undiv(2), SendPolicy::Queue).0).await;
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_never_sent() {
        let adapter = MockAdapter::new();
        let queue = EndpointQueue::new();
        let (stale, stale_rx) = pending(read(1, &[0x0000]), SendPolicy::Queue);
        queue.enqueue(stale).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let (fresh, fresh_rx) = pending(read(2, &[0x4003]), SendPolicy::Queue);
        queue.enqueue(fresh).await;

        assert_eq!(queue.drain(adapter.as_ref(), false).await, Ok(1));
        assert_eq!(stale_rx.await.unwrap(), Err(ZclError::Expired));
        assert_eq!(fresh_rx.await.unwrap(), Ok(None));
        assert_eq!(adapter.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merged_request_keeps_newest_residency() {
        let adapter = MockAdapter::new();
        let queue = EndpointQueue::new();
        let (older, older_rx) = pending(read(1, &[0x0000]), SendPolicy::Queue);
        queue.enqueue(older).await;
        tokio::time::advance(Duration::from_secs(59)).await;
        let (newer, newer_rx) = pending(read(2, &[0x0000]), SendPolicy::Queue);
        queue.enqueue(newer).await;
        assert_eq!(queue.len().await, 1);

        // Past the older request's residency, well within the newer one's
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(queue.drain(adapter.as_ref(), false).await, Ok(1));
        assert_eq!(adapter.sent()[0].decode().header.transaction_sequence_number, 2);
        assert_eq!(older_rx.await.unwrap(), Ok(None));
        assert_eq!(newer_rx.await.unwrap(), Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_drops_expired_entries() {
        let queue = EndpointQueue::new();
        let (stale, stale_rx) = pending(read(1, &[0x0000]), SendPolicy::Queue);
        queue.enqueue(stale).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let (fresh, _fresh_rx) = pending(read(2, &[0x0000]), SendPolicy::Queue);
        queue.enqueue(fresh).await;

        assert_eq!(stale_rx.await.unwrap(), Err(ZclError::Expired));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_caller_expires_without_drain() {
        let queue = EndpointQueue::new();
        let (request, rx) = pending(read(1, &[0x0000]), SendPolicy::Queue);
        let deadline = request.expires_at;
        queue.enqueue(request).await;

        assert_eq!(queue.wait(rx, deadline).await, Err(ZclError::Expired));
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merged_caller_waits_for_newer_deadline() {
        let queue = EndpointQueue::new();
        let started = Instant::now();
        let (older, older_rx) = pending(read(1, &[0x0000]), SendPolicy::Queue);
        let deadline = older.expires_at;
        queue.enqueue(older).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        let (newer, _newer_rx) = pending(read(2, &[0x0000]), SendPolicy::Queue);
        queue.enqueue(newer).await;

        assert_eq!(queue.wait(older_rx, deadline).await, Err(ZclError::Expired));
        assert!(started.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_bulk_waits_for_fast_poll() {
        let adapter = MockAdapter::new();
        let queue = EndpointQueue::new();
        queue.enqueue(pending(read(1, &[0x0000]), SendPolicy::Bulk).0).await;
        queue.enqueue(pending(read(2, &[0x4003]), SendPolicy::Queue).0).await;
        assert!(queue.has_bulk().await);

        assert_eq!(queue.drain(adapter.as_ref(), false).await, Ok(1));
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.drain(adapter.as_ref(), true).await, Ok(1));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_drain() {
        let adapter = MockAdapter::new();
        adapter.reply(Err(AdapterError::Timeout));
        let queue = EndpointQueue::new();
        let (first, first_rx) = pending(read(1, &[0x0000]), SendPolicy::Queue);
        let (second, second_rx) = pending(read(2, &[0x4003]), SendPolicy::Queue);
        queue.enqueue(first).await;
        queue.enqueue(second).await;

        assert_eq!(queue.drain(adapter.as_ref(), false).await, Ok(1));
        assert_eq!(
            first_rx.await.unwrap(),
            Err(ZclError::Transport(AdapterError::Timeout))
        );
        assert_eq!(second_rx.await.unwrap(), Ok(None));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_drain() {
        let adapter = MockAdapter::new();
        adapter.reply(Err(AdapterError::Disconnected));
        let queue = EndpointQueue::new();
        queue.enqueue(pending(read(1, &[0x0000]), SendPolicy::Queue).0).await;
        queue.enqueue(pending(read(2, &[0x4003]), SendPolicy::Queue).0).await;

        assert_eq!(
            queue.drain(adapter.as_ref(), false).await,
            Err(AdapterError::Disconnected)
        );
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.flush(ZclError::Stopping).await, 1);
    }
}
