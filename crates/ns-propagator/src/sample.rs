//! Samples, their histograms and the sample set.

use crate::binning::Binning;
use crate::config::{SampleConfig, SampleSetConfig};
use crate::event::Event;
use ns_core::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};

/// Binned content of one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    content: Vec<f64>,
    sum_w2: Vec<f64>,
    bin_event_list: Vec<Vec<usize>>,
    is_binned: bool,
}

impl Histogram {
    fn with_bins(n_bins: usize) -> Self {
        Self {
            content: vec![0.0; n_bins],
            sum_w2: vec![0.0; n_bins],
            bin_event_list: vec![Vec::new(); n_bins],
            is_binned: false,
        }
    }

    /// Sum of weights per bin
    pub fn content(&self) -> &[f64] {
        &self.content
    }

    /// Sum of squared weights per bin
    pub fn sum_w2(&self) -> &[f64] {
        &self.sum_w2
    }

    /// Event indices per bin
    pub fn bin_event_list(&self) -> &[Vec<usize>] {
        &self.bin_event_list
    }

    /// True once events have been assigned to bins.
    pub fn is_binned(&self) -> bool {
        self.is_binned
    }

    /// Number of bins
    pub fn n_bins(&self) -> usize {
        self.content.len()
    }

    /// Sum over all bins
    pub fn sum(&self) -> f64 {
        self.content.iter().sum()
    }
}

/// One analysis sample: events plus their histogram.
#[derive(Debug, Clone)]
pub struct Sample {
    name: String,
    index: usize,
    enabled: bool,
    binning: Binning,
    events: Vec<Event>,
    histogram: Histogram,
}

impl Sample {
    /// Build an empty sample.
    pub fn from_config(cfg: &SampleConfig, index: usize) -> Result<Self> {
        let binning = Binning::from_config(&cfg.binning)
            .map_err(|e| Error::Config(format!("sample \"{}\": {e}", cfg.name)))?;
        let histogram = Histogram::with_bins(binning.n_bins());
        Ok(Self {
            name: cfg.name.clone(),
            index,
            enabled: cfg.is_enabled,
            binning,
            events: Vec::new(),
            histogram,
        })
    }

    /// Sample name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position in the sample set.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Enabled flag
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Set the enabled flag.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Binning
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Mutable events
    pub fn events_mut(&mut self) -> &mut Vec<Event> {
        &mut self.events
    }

    /// Histogram
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    /// Drop events and zero the histogram.
    pub fn clear(&mut self) {
        self.events.clear();
        self.histogram = Histogram::with_bins(self.binning.n_bins());
    }

    /// Assign every event to its bin and rebuild the per-bin event lists.
    pub fn update_bin_event_list(&mut self) {
        for list in &mut self.histogram.bin_event_list {
            list.clear();
        }
        for (i, event) in self.events.iter_mut().enumerate() {
            event.bin_index = self.binning.find_bin(event);
            if let Some(bin) = event.bin_index {
                self.histogram.bin_event_list[bin].push(i);
            }
        }
        self.histogram.is_binned = true;
    }

    /// Refill bin contents from the current event weights.
    pub fn refill_histogram(&mut self) {
        for (bin, events) in self.histogram.bin_event_list.iter().enumerate() {
            let (sum, sum2) = events.iter().fold((0.0, 0.0), |(s, s2), &i| {
                let w = self.events[i].weight;
                (s + w, s2 + w * w)
            });
            self.histogram.content[bin] = sum;
            self.histogram.sum_w2[bin] = sum2;
        }
    }

    fn ensure_binned(&self, what: &str) -> Result<()> {
        if self.histogram.is_binned {
            Ok(())
        } else {
            Err(Error::Usage(format!(
                "sample \"{}\": {what} requested before the histogram was binned",
                self.name
            )))
        }
    }

    /// Multiply each binned event weight by a Poisson(1) draw, then refill.
    pub fn throw_event_mc_error<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.ensure_binned("event MC throw")?;
        let poisson = Poisson::new(1.0)
            .map_err(|e| Error::Computation(format!("Poisson(1) distribution: {e}")))?;
        for event in self.events.iter_mut().filter(|e| e.bin_index.is_some()) {
            let factor: f64 = poisson.sample(rng);
            event.mc_throw_factor *= factor;
            event.weight *= factor;
        }
        self.refill_histogram();
        Ok(())
    }

    /// Fluctuate every bin content.
    ///
    /// Poisson by default. The gaussian variant draws `N(c, sqrt(c))` truncated
    /// at zero, which is biased for bins with small expected content. Event
    /// weights of the bin are rescaled so a later refill reproduces the draw.
    pub fn throw_stat_error<R: Rng + ?Sized>(&mut self, rng: &mut R, gaussian: bool) -> Result<()> {
        self.ensure_binned("statistical throw")?;
        for bin in 0..self.histogram.n_bins() {
            let expected = self.histogram.content[bin];
            if expected <= 0.0 {
                continue;
            }
            let thrown = if gaussian {
                let normal = Normal::new(expected, expected.sqrt())
                    .map_err(|e| Error::Computation(format!("Normal distribution: {e}")))?;
                normal.sample(rng).max(0.0)
            } else {
                let poisson = Poisson::new(expected)
                    .map_err(|e| Error::Computation(format!("Poisson distribution: {e}")))?;
                poisson.sample(rng)
            };

            let scale = thrown / expected;
            for &i in &self.histogram.bin_event_list[bin] {
                self.events[i].weight *= scale;
            }
            self.histogram.content[bin] = thrown;
            self.histogram.sum_w2[bin] = thrown;
        }
        Ok(())
    }

    /// Number of events assigned to a bin.
    pub fn nb_binned_events(&self) -> usize {
        self.events.iter().filter(|e| e.bin_index.is_some()).count()
    }

    /// Weighted sum of the binned events.
    pub fn sum_weights(&self) -> f64 {
        self.events.iter().filter(|e| e.bin_index.is_some()).map(|e| e.weight).sum()
    }
}

/// Ordered list of samples.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    /// Build every configured sample.
    pub fn from_config(cfg: &SampleSetConfig) -> Result<Self> {
        let samples = cfg
            .sample_list
            .iter()
            .enumerate()
            .map(|(i, s)| Sample::from_config(s, i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { samples })
    }

    /// Samples in configuration order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Mutable samples
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Consume the set.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Number of samples (enabled or not).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample is defined.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index of a sample by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|s| s.name == name)
    }

    /// Total number of bins.
    pub fn n_bins(&self) -> usize {
        self.samples.iter().map(|s| s.binning.n_bins()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinningConfig;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn filled_sample() -> Sample {
        let cfg = SampleConfig {
            name: "numu".into(),
            is_enabled: true,
            binning: BinningConfig {
                variables: vec!["x".into()],
                edges: vec![0.0, 1.0, 2.0],
                bins: vec![],
            },
        };
        let mut s = Sample::from_config(&cfg, 0).unwrap();
        for (x, w) in [(0.5, 2.0), (0.7, 3.0), (1.5, 1.0), (5.0, 10.0)] {
            let vars = BTreeMap::from([("x".to_string(), x)]);
            s.events_mut().push(Event::new(vars, w, 0));
        }
        s
    }

    #[test]
    fn test_bin_and_refill() {
        let mut s = filled_sample();
        s.update_bin_event_list();
        s.refill_histogram();
        assert_eq!(s.histogram().content(), &[5.0, 1.0]);
        assert_eq!(s.histogram().sum_w2(), &[13.0, 1.0]);
        assert_eq!(s.nb_binned_events(), 3);
        assert_eq!(s.sum_weights(), 6.0);
    }

    #[test]
    fn test_throw_before_binning_is_usage_error() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let mut s = filled_sample();
        assert!(matches!(s.throw_stat_error(&mut rng, false), Err(Error::Usage(_))));
        assert!(matches!(s.throw_event_mc_error(&mut rng), Err(Error::Usage(_))));
    }

    #[test]
    fn test_stat_throw_is_consistent_with_refill() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let mut s = filled_sample();
        s.update_bin_event_list();
        s.refill_histogram();
        s.throw_stat_error(&mut rng, false).unwrap();
        let thrown = s.histogram().content().to_vec();
        assert!(thrown.iter().all(|c| *c >= 0.0 && c.fract() == 0.0));
        s.refill_histogram();
        for (a, b) in thrown.iter().zip(s.histogram().content()) {
            approx::assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_gaussian_throw_is_non_negative() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let mut s = filled_sample();
        s.update_bin_event_list();
        s.refill_histogram();
        for _ in 0..20 {
            s.throw_stat_error(&mut rng, true).unwrap();
            assert!(s.histogram().content().iter().all(|c| *c >= 0.0));
        }
    }
}
