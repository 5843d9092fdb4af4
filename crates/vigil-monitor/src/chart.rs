//! Ring buffer of darkness-ratio samples for the chart.

use std::collections::VecDeque;

/// Default number of samples retained; the oldest is evicted past this.
pub const CHART_CAPACITY: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSample {
    /// Wall-clock label ("HH:MM:SS").
    pub label: String,
    pub ratio: f32,
}

/// Bounded series of chart samples, oldest evicted first.
pub struct ChartSeries {
    samples: VecDeque<ChartSample>,
    capacity: usize,
}

impl ChartSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: ChartSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&ChartSample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &ChartSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: &str, ratio: f32) -> ChartSample {
        ChartSample { label: label.into(), ratio }
    }

    #[test]
    fn test_push_and_latest() {
        let mut series = ChartSeries::new(4);
        series.push(sample("10:00:00", 0.1));
        series.push(sample("10:00:01", 0.2));
        assert_eq!(series.len(), 2);
        assert_eq!(series.latest().unwrap().ratio, 0.2);
    }

    #[test]
    fn test_bounded_eviction_drops_oldest() {
        let mut series = ChartSeries::new(3);
        for i in 0..5 {
            series.push(sample(&format!("t{i}"), i as f32 / 10.0));
        }
        assert_eq!(series.len(), 3);
        let labels: Vec<&str> = series.samples().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["t2", "t3", "t4"]);
    }
}
