//! PyO3 bindings for the merit-order clearing engine.
//!
//! Exposes the stack builder and clearing engine to Python:
//! - `Bid` value type
//! - `BidStack.build` / `BidStack.clear`
//! - Typed exceptions, all subclasses of `ValueError`

use pyo3::create_exception;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use merit_clearing::{build_stack, clear_detailed, BidStack as RustBidStack};
use merit_core::{Bid as RustBid, Demand, Error as RustError, ErrorKind};

// ============================================================================
// Exceptions
// ============================================================================

create_exception!(merit_order, MeritError, PyValueError, "Base class for clearing errors.");
create_exception!(merit_order, ValidationError, MeritError, "Malformed demand, date or period.");
create_exception!(merit_order, DataIntegrityError, MeritError, "Empty or invalid bid data.");
create_exception!(
    merit_order,
    DemandExceedsCapacityError,
    MeritError,
    "Demand is greater than the stack's total capacity."
);
create_exception!(
    merit_order,
    NoClearingRowError,
    MeritError,
    "No stack row reaches the demand (internal defect)."
);

fn to_py_err(err: RustError) -> PyErr {
    let msg = err.to_string();
    match err.kind() {
        ErrorKind::Validation => ValidationError::new_err(msg),
        ErrorKind::DataIntegrity => DataIntegrityError::new_err(msg),
        ErrorKind::DemandExceedsCapacity => DemandExceedsCapacityError::new_err(msg),
        ErrorKind::NoClearingRow => NoClearingRowError::new_err(msg),
        _ => MeritError::new_err(msg),
    }
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// A single supply offer.
#[pyclass]
#[derive(Clone, Copy)]
pub struct Bid {
    #[pyo3(get, set)]
    pub price: f64,
    #[pyo3(get, set)]
    pub volume: f64,
}

#[pymethods]
impl Bid {
    #[new]
    fn new(price: f64, volume: f64) -> Self {
        Bid { price, volume }
    }

    fn __repr__(&self) -> String {
        format!("Bid(price={}, volume={})", self.price, self.volume)
    }
}

impl From<Bid> for RustBid {
    fn from(b: Bid) -> Self {
        RustBid::new(b.price, b.volume)
    }
}

/// Merit-ordered bids of one trading period.
#[pyclass]
pub struct BidStack {
    inner: RustBidStack,
}

#[pymethods]
impl BidStack {
    /// Build a stack from bids (stable ascending price order).
    #[staticmethod]
    fn build(bids: Vec<Bid>) -> PyResult<Self> {
        let bids: Vec<RustBid> = bids.into_iter().map(Into::into).collect();
        let inner = build_stack(&bids).map_err(to_py_err)?;
        Ok(BidStack { inner })
    }

    /// Clearing price for `demand`.
    fn clear(&self, demand: f64) -> PyResult<f64> {
        self.clearing_point(demand).map(|(price, _, _)| price)
    }

    /// Marginal row for `demand` as `(price, cumulative_volume, index)`.
    fn clearing_point(&self, demand: f64) -> PyResult<(f64, f64, usize)> {
        let demand = Demand::new(demand).map_err(to_py_err)?;
        let point = clear_detailed(&self.inner, demand).map_err(to_py_err)?;
        Ok((point.price, point.cumulative_volume, point.index))
    }

    /// Total offered volume.
    #[getter]
    fn max_volume(&self) -> f64 {
        self.inner.max_volume()
    }

    /// Rows as `(price, volume, cumulative_volume)` tuples in merit order.
    fn rows(&self) -> Vec<(f64, f64, f64)> {
        self.inner
            .rows()
            .iter()
            .map(|r| (r.price, r.volume, r.cumulative_volume))
            .collect()
    }

    /// Step curve as `(cumulative_volume, price)` points.
    fn step_curve(&self) -> Vec<(f64, f64)> {
        self.inner
            .step_curve()
            .into_iter()
            .map(|p| (p.cumulative_volume, p.price))
            .collect()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "BidStack(bids={}, max_volume={})",
            self.inner.len(),
            self.inner.max_volume()
        )
    }
}

/// Build a stack from `(price, volume)` pairs and clear `demand` in one call.
#[pyfunction]
fn clearing_price(bids: Vec<(f64, f64)>, demand: f64) -> PyResult<f64> {
    let bids: Vec<RustBid> = bids.into_iter().map(|(p, v)| RustBid::new(p, v)).collect();
    let stack = build_stack(&bids).map_err(to_py_err)?;
    let demand = Demand::new(demand).map_err(to_py_err)?;
    clear_detailed(&stack, demand).map(|p| p.price).map_err(to_py_err)
}

// ============================================================================
// Module Definition
// ============================================================================

/// Merit order - clearing price engine for Python.
#[pymodule]
fn merit_order(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = m.py();

    // Types
    m.add_class::<Bid>()?;
    m.add_class::<BidStack>()?;

    // Functions
    m.add_function(wrap_pyfunction!(clearing_price, m)?)?;

    // Exceptions
    m.add("MeritError", py.get_type_bound::<MeritError>())?;
    m.add("ValidationError", py.get_type_bound::<ValidationError>())?;
    m.add("DataIntegrityError", py.get_type_bound::<DataIntegrityError>())?;
    m.add("DemandExceedsCapacityError", py.get_type_bound::<DemandExceedsCapacityError>())?;
    m.add("NoClearingRowError", py.get_type_bound::<NoClearingRowError>())?;

    Ok(())
}
