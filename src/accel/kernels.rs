//! Kernels launched by the engine.
//!
//! Each kernel runs as a single work item. The bodies are plain functions over
//! device memory so that a backend only has to resolve its arguments; the host
//! ring buffer runs [`ring_insert`] directly, which keeps both residencies on
//! the same code.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// `(storage: array, out: array, cursor: index, full: flag, value: scalar)`
    RingInsert,
    /// `(out: array, price: scalar, prev: scalar, alpha: scalar)`
    EmaStep,
    /// `(out: array, avg_gain: scalar, avg_loss: scalar)`
    RsiRatio,
}

impl Kernel {
    pub fn symbol(self) -> &'static str {
        match self {
            Kernel::RingInsert => "ring_insert_f64",
            Kernel::EmaStep => "ema_step_f64",
            Kernel::RsiRatio => "rsi_ratio_f64",
        }
    }

    pub fn signature(self) -> &'static [&'static str] {
        match self {
            Kernel::RingInsert => &["array", "array", "index", "flag", "scalar"],
            Kernel::EmaStep => &["array", "scalar", "scalar", "scalar"],
            Kernel::RsiRatio => &["array", "scalar", "scalar"],
        }
    }
}

/// Writes `value` at `cursor`. `out[0]` receives the overwritten entry when
/// the ring is full and `0.0` otherwise.
pub fn ring_insert(storage: &mut [f64], out: &mut [f64], cursor: usize, full: bool, value: f64) {
    out[0] = if full { storage[cursor] } else { 0.0 };
    storage[cursor] = value;
}

pub fn ema_step(out: &mut [f64], price: f64, prev: f64, alpha: f64) {
    out[0] = price * alpha + prev * (1.0 - alpha);
}

pub fn rsi_ratio(out: &mut [f64], avg_gain: f64, avg_loss: f64) {
    out[0] = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };
}
