use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use rand::Rng;

use crate::service::error::BusError;

/// How often a blocked receive wakes up to check for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Exponential reconnect delay with random jitter
///
/// Each failure doubles the base delay up to `max`, the returned delay is
/// somewhere between half and all of it.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Backoff {
            min,
            max: max.max(min),
            attempt: 0,
        }
    }

    /// Delay before the next reconnect attempt
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let base = self.min.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let half = base / 2;
        let jitter_ms = half.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        (base - half) + jitter
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// A running pub/sub listener on its own thread
pub struct Subscription {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Subscribes to `channel` and hands every payload to `on_message`.
    ///
    /// The listener blocks a dedicated thread. Whenever the connection drops
    /// it reconnects and re-subscribes after a jittered backoff, until
    /// [`Subscription::close`] is called.
    pub fn start<F>(
        client: redis::Client,
        channel: &str,
        mut backoff: Backoff,
        on_message: F,
    ) -> std::io::Result<Subscription>
    where
        F: Fn(String) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let local_running = running.clone();
        let channel = channel.to_string();

        let thread = thread::Builder::new()
            .name("shard-transfer-redis".into())
            .spawn(move || {
                info!("Starting redis pub/sub listener on channel '{}'", channel);

                while local_running.load(Ordering::Acquire) {
                    match listen(&client, &channel, &local_running, &mut backoff, &on_message) {
                        Ok(_) => break,
                        Err(e) => {
                            error!(
                                "Redis listener lost its connection, seamless transfers are paused: {}",
                                e
                            );
                        }
                    }

                    let delay = backoff.next_delay();
                    warn!(
                        "Reconnecting to redis in {:?} (attempt {})",
                        delay,
                        backoff.attempt()
                    );
                    sleep_while_running(delay, &local_running);
                }

                info!("Redis pub/sub listener on '{}' stopped", channel);
            })?;

        Ok(Subscription {
            running,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the listener and waits for its thread to exit
    pub fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Redis listener thread panicked");
            }
        }
    }
}

impl Subscription {
    /// Same as [`Subscription::close`], joining the listener thread on
    /// tokio's blocking pool instead of the calling worker
    pub async fn shutdown(mut self) {
        self.running.store(false, Ordering::Release);
        if let Err(e) = tokio::task::spawn_blocking(move || self.close()).await {
            error!("Could not join redis listener thread: {}", e);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Runs one connection's worth of the receive loop.
///
/// Returns `Ok` only when asked to stop, any transport failure is an `Err`.
fn listen<F>(
    client: &redis::Client,
    channel: &str,
    running: &AtomicBool,
    backoff: &mut Backoff,
    on_message: &F,
) -> Result<(), BusError>
where
    F: Fn(String),
{
    let mut con = client.get_connection()?;
    let mut pubsub = con.as_pubsub();
    pubsub.subscribe(channel)?;
    pubsub.set_read_timeout(Some(POLL_INTERVAL))?;

    info!("Subscribed to redis channel: {}", channel);
    backoff.reset();

    while running.load(Ordering::Acquire) {
        let msg = match pubsub.get_message() {
            Ok(msg) => msg,
            Err(e) if e.is_timeout() => continue,
            Err(e) => return Err(e.into()),
        };

        match msg.get_payload::<String>() {
            Ok(payload) => on_message(payload),
            Err(e) => {
                warn!(
                    "Skipping unreadable payload on {}: {}",
                    msg.get_channel_name(),
                    e
                );
            }
        }
    }

    Ok(())
}

fn sleep_while_running(delay: Duration, running: &AtomicBool) {
    let mut remaining = delay;
    while !remaining.is_zero() && running.load(Ordering::Acquire) {
        let step = remaining.min(POLL_INTERVAL);
        thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));

        let expected_bases = [100u64, 200, 400, 800, 1000, 1000, 1000];
        for base in expected_bases {
            let delay = backoff.next_delay().as_millis() as u64;
            assert!(
                delay >= base / 2 && delay <= base,
                "delay {} outside [{}, {}]",
                delay,
                base / 2,
                base
            );
        }
    }

    #[test]
    fn backoff_resets_after_success() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30));
        for _ in 0..5 {
            backoff.next_delay();
        }
        assert_eq!(backoff.attempt(), 5);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay() <= Duration::from_millis(100));
    }

    #[test]
    fn backoff_survives_many_failures() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(30));
        }
    }

    #[test]
    fn max_below_min_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(10));
        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(250) && delay <= Duration::from_millis(500));
    }

    #[test]
    fn unreachable_redis_keeps_retrying_until_closed() {
        // Nothing listens on port 1, every connect attempt fails immediately
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let local_received = received.clone();

        let mut subscription = Subscription::start(
            client,
            "shard_transfer_requests",
            Backoff::new(Duration::from_millis(10), Duration::from_millis(20)),
            move |payload| local_received.lock().unwrap().push(payload),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(subscription.is_running());

        subscription.close();
        assert!(!subscription.is_running());
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_does_not_block_the_runtime() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let subscription = Subscription::start(
            client,
            "shard_transfer_requests",
            Backoff::new(Duration::from_millis(200), Duration::from_millis(400)),
            |_| {},
        )
        .unwrap();
        let running = subscription.running.clone();

        // The listener sits in a reconnect sleep of at least 100ms, ticks keep
        // coming on this single threaded runtime while that join happens elsewhere
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let local_ticks = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                local_ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let before = ticks.load(Ordering::SeqCst);
        subscription.shutdown().await;

        assert!(!running.load(Ordering::Acquire));
        assert!(ticks.load(Ordering::SeqCst) > before);
        ticker.abort();
    }
}
