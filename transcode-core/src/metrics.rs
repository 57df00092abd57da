//! Optional metrics for stages and graphs.
//!
//! The macros forward to the `metrics` crate when the `metrics` feature is
//! enabled and compile to nothing otherwise.
//!
//! ```ignore
//! use transcode_core::metrics::{record_counter, record_histogram};
//!
//! record_counter!("stage.units_in", 1);
//! record_histogram!("graph.pull_duration_ns", start.elapsed().as_nanos() as f64);
//! ```
//!
//! Names in use:
//! - `stage.units_in` / `stage.units_out`: units through any session
//! - `chain.units_pumped`: units handed from one chain stage to the next
//! - `graph.units_pushed` / `graph.units_pulled`: units at graph sources and sinks
//! - `pool.surfaces_in_use`: acquired hardware surfaces
//! - `transcode.duration_ns`: wall time of a whole job

/// Record a counter metric (increments by given value).
///
/// When the `metrics` feature is disabled, this is a no-op.
///
/// # Example
///
/// ```ignore
/// record_counter!("stage.units_in", 1);
/// record_counter!("stage.units_in", 1, "stage" => "rawvideo");
/// ```
#[macro_export]
#[cfg(feature = "metrics")]
macro_rules! record_counter {
    ($name:expr, $value:expr) => {
        $crate::__metrics::counter!($name).increment($value)
    };
    ($name:expr, $value:expr, $($label_key:expr => $label_value:expr),+ $(,)?) => {
        $crate::__metrics::counter!($name, $($label_key => $label_value),+).increment($value)
    };
}

#[macro_export]
#[cfg(not(feature = "metrics"))]
macro_rules! record_counter {
    ($name:expr, $value:expr) => {
        let _ = ($name, $value);
    };
    ($name:expr, $value:expr, $($label_key:expr => $label_value:expr),+ $(,)?) => {
        let _ = ($name, $value, $($label_key, $label_value),+);
    };
}

/// Record a histogram/distribution metric.
///
/// When the `metrics` feature is disabled, this is a no-op.
///
/// # Example
///
/// ```ignore
/// record_histogram!("graph.pull_duration_ns", start.elapsed().as_nanos() as f64);
/// ```
#[macro_export]
#[cfg(feature = "metrics")]
macro_rules! record_histogram {
    ($name:expr, $value:expr) => {
        $crate::__metrics::histogram!($name).record($value)
    };
    ($name:expr, $value:expr, $($label_key:expr => $label_value:expr),+ $(,)?) => {
        $crate::__metrics::histogram!($name, $($label_key => $label_value),+).record($value)
    };
}

#[macro_export]
#[cfg(not(feature = "metrics"))]
macro_rules! record_histogram {
    ($name:expr, $value:expr) => {
        let _ = ($name, $value);
    };
    ($name:expr, $value:expr, $($label_key:expr => $label_value:expr),+ $(,)?) => {
        let _ = ($name, $value, $($label_key, $label_value),+);
    };
}

/// Record a gauge metric (absolute value).
///
/// When the `metrics` feature is disabled, this is a no-op.
///
/// # Example
///
/// ```ignore
/// record_gauge!("graph.source_queue_depth", queue.len() as f64);
/// ```
#[macro_export]
#[cfg(feature = "metrics")]
macro_rules! record_gauge {
    ($name:expr, $value:expr) => {
        $crate::__metrics::gauge!($name).set($value)
    };
    ($name:expr, $value:expr, $($label_key:expr => $label_value:expr),+ $(,)?) => {
        $crate::__metrics::gauge!($name, $($label_key => $label_value),+).set($value)
    };
}

#[macro_export]
#[cfg(not(feature = "metrics"))]
macro_rules! record_gauge {
    ($name:expr, $value:expr) => {
        let _ = ($name, $value);
    };
    ($name:expr, $value:expr, $($label_key:expr => $label_value:expr),+ $(,)?) => {
        let _ = ($name, $value, $($label_key, $label_value),+);
    };
}

pub use record_counter;
pub use record_gauge;
pub use record_histogram;

/// Helper to time an operation and record a histogram.
///
/// Returns the result of the closure and records the duration.
///
/// # Example
///
/// ```ignore
/// let stats = timed("transcode.duration_ns", || transcoder.run(&mut source, &mut sink))?;
/// ```
#[inline]
pub fn timed<F, R>(metric_name: &'static str, f: F) -> R
where
    F: FnOnce() -> R,
{
    #[cfg(feature = "metrics")]
    {
        let start = std::time::Instant::now();
        let result = f();
        record_histogram!(metric_name, start.elapsed().as_nanos() as f64);
        result
    }

    #[cfg(not(feature = "metrics"))]
    {
        let _ = metric_name;
        f()
    }
}
