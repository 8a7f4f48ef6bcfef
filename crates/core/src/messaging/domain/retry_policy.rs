use std::time::Duration;

/// Bounded retry ladder: one immediate attempt, then one attempt after each delay.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().map(|&ms| Duration::from_millis(ms)).collect())
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(Vec::new())
    }

    pub fn attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Time spent sleeping if every attempt fails.
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Runs `op` until it succeeds or the ladder is exhausted, sleeping the
    /// calling thread between attempts. Returns the last error.
    pub fn run<T, E: std::fmt::Display>(
        &self,
        label: &str,
        op: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<T, E> {
        self.run_with_sleep(label, op, std::thread::sleep)
    }

    pub fn run_with_sleep<T, E: std::fmt::Display>(
        &self,
        label: &str,
        mut op: impl FnMut(usize) -> Result<T, E>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, E> {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => match self.delays.get(attempt) {
                    Some(&delay) => {
                        log::warn!(
                            "{label} failed (attempt {}/{}): {e}; retrying in {delay:?}",
                            attempt + 1,
                            self.attempts()
                        );
                        sleep(delay);
                        attempt += 1;
                    }
                    None => {
                        log::warn!("{label} failed after {} attempts: {e}", self.attempts());
                        return Err(e);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_success_does_not_sleep() {
        let policy = RetryPolicy::from_millis(&[100, 200]);
        let mut slept = Vec::new();
        let result: Result<u8, String> =
            policy.run_with_sleep("op", |_| Ok(1), |d| slept.push(d));
        assert_eq!(result, Ok(1));
        assert!(slept.is_empty());
    }

    #[test]
    fn test_retries_until_success() {
        let policy = RetryPolicy::from_millis(&[100, 200]);
        let mut slept = Vec::new();
        let result: Result<usize, String> = policy.run_with_sleep(
            "op",
            |attempt| if attempt < 2 { Err("nope".into()) } else { Ok(attempt) },
            |d| slept.push(d),
        );
        assert_eq!(result, Ok(2));
        assert_eq!(slept, vec![Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[test]
    fn test_gives_up_after_ladder_with_last_error() {
        let policy = RetryPolicy::from_millis(&[1, 1]);
        let mut calls = 0;
        let result: Result<(), String> = policy.run_with_sleep(
            "op",
            |attempt| {
                calls += 1;
                Err(format!("fail {attempt}"))
            },
            |_| {},
        );
        assert_eq!(result, Err("fail 2".to_string()));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_once_makes_single_attempt() {
        let policy = RetryPolicy::once();
        assert_eq!(policy.attempts(), 1);
        let mut calls = 0;
        let _: Result<(), &str> = policy.run_with_sleep(
            "op",
            |_| {
                calls += 1;
                Err("x")
            },
            |_| {},
        );
        assert_eq!(calls, 1);
    }
}
