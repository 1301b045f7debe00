use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

/// Bounded event queue capacity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Tick,
    Resize,
}

/// Merges terminal input with a fixed-rate tick into one queue for the UI loop.
pub struct EventHandler {
    rx: mpsc::Receiver<Event>,
    _task: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        Self::from_stream(EventStream::new(), tick_rate)
    }

    /// Build an EventHandler from any crossterm-compatible event stream.
    /// Tests inject a fake stream.
    pub fn from_stream<S>(stream: S, tick_rate: Duration) -> Self
    where
        S: Stream<Item = Result<CrosstermEvent, std::io::Error>> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut reader = stream;
            let mut tick = tokio::time::interval(tick_rate);

            loop {
                let event = tokio::select! {
                    _ = tick.tick() => {
                        // Coalesce ticks when the queue is full.
                        match tx.try_send(Event::Tick) {
                            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => continue,
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                    event = reader.next() => match event {
                        // Release/repeat events would double every keypress on some terminals.
                        Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                            Event::Key(key)
                        }
                        Some(Ok(CrosstermEvent::Resize(_, _))) => Event::Resize,
                        Some(Ok(_)) => continue,
                        Some(Err(_)) | None => break,
                    },
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Self { rx, _task: task }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEventState, KeyModifiers};

    fn fake_stream(
        events: Vec<Result<CrosstermEvent, std::io::Error>>,
    ) -> impl Stream<Item = Result<CrosstermEvent, std::io::Error>> + Send + Unpin {
        futures::stream::iter(events)
    }

    fn key_event(code: KeyCode) -> CrosstermEvent {
        CrosstermEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn next_non_tick(handler: &mut EventHandler) -> Option<Event> {
        loop {
            match handler.next().await {
                Some(Event::Tick) => continue,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn forwards_key_events() {
        let stream = fake_stream(vec![
            Ok(key_event(KeyCode::Char('j'))),
            Ok(key_event(KeyCode::Enter)),
        ]);
        let mut handler = EventHandler::from_stream(stream, Duration::from_secs(60));

        let e1 = next_non_tick(&mut handler).await.unwrap();
        assert!(matches!(e1, Event::Key(k) if k.code == KeyCode::Char('j')));
        let e2 = next_non_tick(&mut handler).await.unwrap();
        assert!(matches!(e2, Event::Key(k) if k.code == KeyCode::Enter));
    }

    #[tokio::test]
    async fn key_release_is_dropped() {
        let release = CrosstermEvent::Key(KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        });
        let stream = fake_stream(vec![Ok(release), Ok(key_event(KeyCode::Char('r')))]);
        let mut handler = EventHandler::from_stream(stream, Duration::from_secs(60));

        let e = next_non_tick(&mut handler).await.unwrap();
        assert!(matches!(e, Event::Key(k) if k.code == KeyCode::Char('r')));
    }

    #[tokio::test]
    async fn forwards_resize_events() {
        let stream = fake_stream(vec![Ok(CrosstermEvent::Resize(120, 40))]);
        let mut handler = EventHandler::from_stream(stream, Duration::from_secs(60));

        let e = next_non_tick(&mut handler).await.unwrap();
        assert!(matches!(e, Event::Resize));
    }

    #[tokio::test]
    async fn tick_fires_on_interval() {
        let stream = futures::stream::pending();
        let mut handler = EventHandler::from_stream(stream, Duration::from_millis(10));

        let e = handler.next().await.unwrap();
        assert!(matches!(e, Event::Tick));
    }

    #[tokio::test]
    async fn ignores_other_crossterm_events() {
        let stream = fake_stream(vec![
            Ok(CrosstermEvent::FocusGained),
            Ok(key_event(KeyCode::Char('x'))),
        ]);
        let mut handler = EventHandler::from_stream(stream, Duration::from_secs(60));

        let e = next_non_tick(&mut handler).await.unwrap();
        assert!(matches!(e, Event::Key(k) if k.code == KeyCode::Char('x')));
    }

    #[tokio::test]
    async fn stream_error_ends_loop() {
        let stream = fake_stream(vec![
            Ok(key_event(KeyCode::Char('a'))),
            Err(std::io::Error::other("fail")),
        ]);
        let mut handler = EventHandler::from_stream(stream, Duration::from_secs(60));

        assert!(matches!(next_non_tick(&mut handler).await, Some(Event::Key(_))));
        assert!(next_non_tick(&mut handler).await.is_none());
    }

    #[tokio::test]
    async fn stream_end_closes_channel() {
        let stream = fake_stream(vec![Ok(key_event(KeyCode::Char('z')))]);
        let mut handler = EventHandler::from_stream(stream, Duration::from_secs(60));

        assert!(matches!(next_non_tick(&mut handler).await, Some(Event::Key(_))));
        assert!(next_non_tick(&mut handler).await.is_none());
    }
}
