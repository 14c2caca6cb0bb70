//! Structured parameter blocks for multi-signal lattice fits.
//!
//! The flat parameter vector is laid out as
//!
//! ```text
//! [baseline] [exchange block?] { [amplitude] [decay rate, decay floor]? { [width] [position] }×dims }×signals
//! ```
//!
//! All offset arithmetic lives here; the model and the guess builder resolve
//! indices through [`ParameterLayout`] instead of computing them by hand.

use serde::{Deserialize, Serialize};

/// Which kinetic submodel drives the amplitude across delay planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KineticsKind {
    /// Amplitude is the same in every plane.
    #[default]
    None,

    /// Per-signal `(A - C)e^{-bt} + C`.
    Decay,

    /// Shared two-state exchange with a single relaxation rate: `[r1, pop_a, k_ex]`.
    Exchange,

    /// Shared two-state exchange with independent rates: `[r1a, r1b, kab, kba, pop_a]`.
    GeneralExchange,
}

impl KineticsKind {
    /// Number of parameters in the shared exchange block.
    pub fn exchange_len(&self) -> usize {
        match self {
            KineticsKind::Exchange => 3,
            KineticsKind::GeneralExchange => 5,
            _ => 0,
        }
    }

    /// Names of the shared exchange parameters.
    pub fn exchange_names(&self) -> &'static [&'static str] {
        match self {
            KineticsKind::Exchange => &["r1", "pop_a", "k_ex"],
            KineticsKind::GeneralExchange => &["r1a", "r1b", "kab", "kba", "pop_a"],
            _ => &[],
        }
    }

    pub fn is_exchange(&self) -> bool {
        self.exchange_len() > 0
    }
}

/// Indices of one spectral dimension of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimBlock {
    pub width: usize,
    pub position: usize,
}

/// Indices belonging to one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalBlock {
    pub amplitude: usize,
    /// Index of the decay rate; the floor follows it.
    pub decay: Option<usize>,
    pub dims: Vec<DimBlock>,
}

/// Index resolution for the flat parameter vector of a lattice fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLayout {
    kinetics: KineticsKind,
    n_dims: usize,
    exchange_start: Option<usize>,
    signals: Vec<SignalBlock>,
    len: usize,
}

impl ParameterLayout {
    /// Lay out `n_signals` signals over `n_dims` dimensions.
    pub fn new(n_signals: usize, n_dims: usize, kinetics: KineticsKind) -> Self {
        let mut next = 1;
        let exchange_start = if kinetics.is_exchange() {
            let start = next;
            next += kinetics.exchange_len();
            Some(start)
        } else {
            None
        };

        let mut signals = Vec::with_capacity(n_signals);
        for _ in 0..n_signals {
            let amplitude = next;
            next += 1;
            let decay = if kinetics == KineticsKind::Decay {
                let start = next;
                next += 2;
                Some(start)
            } else {
                None
            };
            let dims = (0..n_dims)
                .map(|_| {
                    let block = DimBlock {
                        width: next,
                        position: next + 1,
                    };
                    next += 2;
                    block
                })
                .collect();
            signals.push(SignalBlock {
                amplitude,
                decay,
                dims,
            });
        }

        Self {
            kinetics,
            n_dims,
            exchange_start,
            signals,
            len: next,
        }
    }

    /// Total length of the parameter vector.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kinetics(&self) -> KineticsKind {
        self.kinetics
    }

    pub fn n_signals(&self) -> usize {
        self.signals.len()
    }

    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    pub fn signals(&self) -> &[SignalBlock] {
        &self.signals
    }

    /// Index of the baseline ("DC") parameter.
    pub fn baseline(&self) -> usize {
        0
    }

    pub fn amplitude(&self, signal: usize) -> usize {
        self.signals[signal].amplitude
    }

    pub fn width(&self, signal: usize, dim: usize) -> usize {
        self.signals[signal].dims[dim].width
    }

    pub fn position(&self, signal: usize, dim: usize) -> usize {
        self.signals[signal].dims[dim].position
    }

    pub fn decay_rate(&self, signal: usize) -> Option<usize> {
        self.signals[signal].decay
    }

    pub fn decay_floor(&self, signal: usize) -> Option<usize> {
        self.signals[signal].decay.map(|i| i + 1)
    }

    /// Index of the `i`-th shared exchange parameter.
    pub fn exchange(&self, i: usize) -> Option<usize> {
        self.exchange_start
            .filter(|_| i < self.kinetics.exchange_len())
            .map(|start| start + i)
    }

    /// Human-readable name of every parameter, in vector order.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![String::new(); self.len];
        names[0] = "baseline".to_string();
        if let Some(start) = self.exchange_start {
            for (i, name) in self.kinetics.exchange_names().iter().enumerate() {
                names[start + i] = name.to_string();
            }
        }
        for (s, block) in self.signals.iter().enumerate() {
            names[block.amplitude] = format!("s{}.amplitude", s);
            if let Some(rate) = block.decay {
                names[rate] = format!("s{}.decay_rate", s);
                names[rate + 1] = format!("s{}.decay_floor", s);
            }
            for (d, dim) in block.dims.iter().enumerate() {
                names[dim.width] = format!("s{}.d{}.width", s, d);
                names[dim.position] = format!("s{}.d{}.position", s, d);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_layout() {
        let layout = ParameterLayout::new(2, 2, KineticsKind::None);
        assert_eq!(layout.len(), 1 + 2 * (1 + 2 * 2));
        assert_eq!(layout.amplitude(0), 1);
        assert_eq!(layout.width(0, 0), 2);
        assert_eq!(layout.position(0, 1), 5);
        assert_eq!(layout.amplitude(1), 6);
        assert_eq!(layout.position(1, 1), 10);
        assert_eq!(layout.exchange(0), None);
        assert_eq!(layout.decay_rate(1), None);
    }

    #[test]
    fn test_decay_layout() {
        let layout = ParameterLayout::new(1, 1, KineticsKind::Decay);
        assert_eq!(layout.len(), 1 + 1 + 2 + 2);
        assert_eq!(layout.decay_rate(0), Some(2));
        assert_eq!(layout.decay_floor(0), Some(3));
        assert_eq!(layout.width(0, 0), 4);
    }

    #[test]
    fn test_exchange_layout() {
        let layout = ParameterLayout::new(4, 2, KineticsKind::GeneralExchange);
        assert_eq!(layout.exchange(0), Some(1));
        assert_eq!(layout.exchange(4), Some(5));
        assert_eq!(layout.exchange(5), None);
        assert_eq!(layout.amplitude(0), 6);
        assert_eq!(layout.len(), 1 + 5 + 4 * 5);
    }

    #[test]
    fn test_names_cover_every_index() {
        let layout = ParameterLayout::new(2, 2, KineticsKind::Exchange);
        let names = layout.names();
        assert_eq!(names.len(), layout.len());
        assert!(names.iter().all(|n| !n.is_empty()));
        assert_eq!(names[layout.exchange(2).unwrap()], "k_ex");
        assert_eq!(names[layout.width(1, 0)], "s1.d0.width");
    }
}
