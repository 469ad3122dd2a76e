use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use relay_channels::{
    send_chunked_reply, ChannelError, ChatChannel, ChunkOptions, InboundEvent, OutboundFile,
};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Reply { text: String, files: usize },
    Send { channel_id: String, text: String },
}

struct Recorder {
    start: Instant,
    log: Mutex<Vec<(Duration, Sent)>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, s: Sent) {
        self.log.lock().unwrap().push((self.start.elapsed(), s));
    }
}

#[async_trait]
impl ChatChannel for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn reply(
        &self,
        _to: &InboundEvent,
        text: &str,
        files: &[OutboundFile],
    ) -> Result<(), ChannelError> {
        self.record(Sent::Reply {
            text: text.to_string(),
            files: files.len(),
        });
        Ok(())
    }

    async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
        self.record(Sent::Send {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn first_chunk_replies_with_files_and_rest_are_paced() {
    let rec = Recorder::new();
    let to = InboundEvent::new("100", "chan-1", "ann", "question");
    let text = ["a".repeat(50), "b".repeat(50), "c".repeat(50)].join("\n\n");
    let files = vec![OutboundFile {
        filename: "cat.png".into(),
        data: vec![1, 2, 3],
    }];
    let opts = ChunkOptions {
        max_paragraphs: 1,
        max_chars: 60,
        delay: Duration::from_millis(1500),
    };

    let sent = send_chunked_reply(&rec, &to, &text, &files, &opts)
        .await
        .unwrap();
    assert_eq!(sent, 3);

    let log = rec.log.lock().unwrap().clone();
    assert_eq!(
        log[0],
        (
            Duration::ZERO,
            Sent::Reply {
                text: "a".repeat(50),
                files: 1
            }
        )
    );
    assert_eq!(log[1].0, Duration::from_millis(1500));
    assert_eq!(
        log[1].1,
        Sent::Send {
            channel_id: "chan-1".into(),
            text: "b".repeat(50)
        }
    );
    assert_eq!(log[2].0, Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn empty_text_sends_nothing() {
    let rec = Recorder::new();
    let to = InboundEvent::new("1", "c", "ann", "q");
    let sent = send_chunked_reply(&rec, &to, "", &[], &ChunkOptions::default())
        .await
        .unwrap();
    assert_eq!(sent, 0);
    assert!(rec.log.lock().unwrap().is_empty());
}
