//! Per-LMAP running scrape statistics, matching the source's
//! `self.statistics` dict in `LMAP.start_local_scrape_loop`/
//! `dump_statistics`: a scrape count, total elapsed time, and a
//! `scrape_rate_N` sample recorded roughly every 10 seconds of uptime.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ScrapeStats {
    start: Instant,
    num_scrapes: u64,
    time_total: Duration,
    scrape_rate_samples: Vec<f64>,
    scrapes_at_last_sample: u64,
    last_sample_at: Instant,
    num_partials: u64,
    end_time: Option<Duration>,
}

impl ScrapeStats {
    pub fn new(start: Instant) -> Self {
        Self {
            start,
            num_scrapes: 0,
            time_total: Duration::ZERO,
            scrape_rate_samples: Vec::new(),
            scrapes_at_last_sample: 0,
            last_sample_at: start,
            num_partials: 0,
            end_time: None,
        }
    }

    /// Records one successful scrape tick (at least one pod was read).
    pub fn record_scrape(&mut self, now: Instant) {
        self.num_scrapes += 1;
        self.time_total = now.duration_since(self.start);

        if self.time_total.as_secs() / 10 >= self.num_partials {
            let elapsed = now.duration_since(self.last_sample_at);
            let delta = self.num_scrapes - self.scrapes_at_last_sample;
            let rate = if elapsed.as_secs_f64() > 0.0 { delta as f64 / elapsed.as_secs_f64() } else { 0.0 };
            self.scrape_rate_samples.push(rate);
            self.scrapes_at_last_sample = self.num_scrapes;
            self.last_sample_at = now;
            self.num_partials += 1;
        }
        self.end_time = Some(self.time_total);
    }

    pub fn num_scrapes(&self) -> u64 {
        self.num_scrapes
    }

    pub fn time_total(&self) -> Duration {
        self.time_total
    }

    pub fn scrape_rate_samples(&self) -> &[f64] {
        &self.scrape_rate_samples
    }

    /// `key,value` rows in the source's `dump_statistics` order.
    pub fn to_csv_rows(&self) -> Vec<String> {
        let mut rows = vec![
            format!("num_scrapes,{}", self.num_scrapes),
            format!("time_total,{}", self.time_total.as_secs_f64()),
        ];
        for (i, rate) in self.scrape_rate_samples.iter().enumerate() {
            rows.push(format!("scrape_rate_{i},{rate}"));
        }
        if let Some(end) = self.end_time {
            rows.push(format!("end_time,{}", end.as_secs_f64()));
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_scrape_samples_a_rate_immediately() {
        let start = Instant::now();
        let mut stats = ScrapeStats::new(start);
        stats.record_scrape(start + Duration::from_millis(10));
        assert_eq!(stats.num_scrapes(), 1);
        assert_eq!(stats.scrape_rate_samples().len(), 1);
    }

    #[test]
    fn csv_rows_include_every_sampled_rate() {
        let start = Instant::now();
        let mut stats = ScrapeStats::new(start);
        stats.record_scrape(start + Duration::from_millis(5));
        stats.record_scrape(start + Duration::from_secs(11));
        let rows = stats.to_csv_rows();
        assert!(rows.iter().any(|r| r.starts_with("num_scrapes,2")));
        assert!(rows.iter().any(|r| r.starts_with("scrape_rate_0,")));
        assert!(rows.iter().any(|r| r.starts_with("scrape_rate_1,")));
    }
}
