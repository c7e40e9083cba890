use std::time::{Duration, Instant};

/// Statistics for a single generation call.
#[derive(Debug, Clone)]
pub struct GenerationStats {
    /// Number of tokens in the prompt.
    pub prompt_tokens: usize,
    /// Number of tokens generated.
    pub tokens_generated: usize,
    /// Time spent on the prompt forward pass, up to the first sampled token.
    pub time_to_first_token: Duration,
    /// Total generation time.
    pub total_time: Duration,
    /// Throughput in tokens per second.
    pub tokens_per_second: f64,
    start_time: Instant,
    first_token_time: Option<Instant>,
}

impl GenerationStats {
    pub(crate) fn new(prompt_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            tokens_generated: 0,
            time_to_first_token: Duration::default(),
            total_time: Duration::default(),
            tokens_per_second: 0.0,
            start_time: Instant::now(),
            first_token_time: None,
        }
    }

    pub(crate) fn record_token(&mut self) {
        self.tokens_generated += 1;
        if self.first_token_time.is_none() {
            let now = Instant::now();
            self.first_token_time = Some(now);
            self.time_to_first_token = now.duration_since(self.start_time);
        }
    }

    pub(crate) fn finalize(&mut self) {
        self.total_time = self.start_time.elapsed();
        self.tokens_per_second = if self.total_time.as_secs_f64() > 0.0 {
            self.tokens_generated as f64 / self.total_time.as_secs_f64()
        } else {
            0.0
        };
    }

    #[cfg(test)]
    pub(crate) fn override_start(&mut self, start_time: Instant) {
        self.start_time = start_time;
    }
}

#[cfg(test)]
mod tests {
    use super::GenerationStats;
    use std::time::{Duration, Instant};

    #[test]
    fn calculates_timings_and_rate() {
        let mut stats = GenerationStats::new(5);
        stats.override_start(Instant::now() - Duration::from_secs(2));
        for _ in 0..4 {
            stats.record_token();
        }
        stats.finalize();

        assert_eq!(stats.prompt_tokens, 5);
        assert_eq!(stats.tokens_generated, 4);
        assert!(stats.time_to_first_token >= Duration::from_secs(2));
        assert!(stats.total_time >= Duration::from_secs(2));
        assert!(stats.tokens_per_second > 1.0 && stats.tokens_per_second <= 2.0);
    }

    #[test]
    fn empty_run_has_zero_first_token_latency() {
        let mut stats = GenerationStats::new(3);
        stats.finalize();
        assert_eq!(stats.tokens_generated, 0);
        assert_eq!(stats.time_to_first_token, Duration::default());
    }
}
