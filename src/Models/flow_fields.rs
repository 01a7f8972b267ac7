use nalgebra::Vector3;

/// Cell-centred mean flow state supplied by the finite-volume side of the solver
pub trait FlowFields {
    fn velocity(&self, cell: usize) -> Vector3<f64>;
    fn pressure(&self, cell: usize) -> f64;
    /// turbulent kinetic energy
    fn k(&self, cell: usize) -> f64;
    /// dissipation rate of k
    fn epsilon(&self, cell: usize) -> f64;
    fn density(&self, cell: usize) -> f64;
    /// mean of scalar `index`
    fn scalar(&self, index: usize, cell: usize) -> f64;
}

/// Plain per-cell storage of the flow fields
#[derive(Debug, Clone, PartialEq)]
pub struct CellFlowFields {
    pub velocity: Vec<Vector3<f64>>,
    pub pressure: Vec<f64>,
    pub k: Vec<f64>,
    pub epsilon: Vec<f64>,
    pub density: Vec<f64>,
    /// scalars[index][cell]
    pub scalars: Vec<Vec<f64>>,
}

impl CellFlowFields {
    /// the same state in every cell
    pub fn uniform(
        n_cells: usize,
        velocity: Vector3<f64>,
        pressure: f64,
        k: f64,
        epsilon: f64,
        density: f64,
        scalars: &[f64],
    ) -> Self {
        Self {
            velocity: vec![velocity; n_cells],
            pressure: vec![pressure; n_cells],
            k: vec![k; n_cells],
            epsilon: vec![epsilon; n_cells],
            density: vec![density; n_cells],
            scalars: scalars.iter().map(|&s| vec![s; n_cells]).collect(),
        }
    }

    pub fn n_cells(&self) -> usize {
        self.density.len()
    }

    /// turbulence frequency epsilon / k of a cell, zero for vanishing k
    pub fn omega(&self, cell: usize) -> f64 {
        mean_frequency(self.k[cell], self.epsilon[cell])
    }
}

impl FlowFields for CellFlowFields {
    fn velocity(&self, cell: usize) -> Vector3<f64> {
        self.velocity[cell]
    }
    fn pressure(&self, cell: usize) -> f64 {
        self.pressure[cell]
    }
    fn k(&self, cell: usize) -> f64 {
        self.k[cell]
    }
    fn epsilon(&self, cell: usize) -> f64 {
        self.epsilon[cell]
    }
    fn density(&self, cell: usize) -> f64 {
        self.density[cell]
    }
    fn scalar(&self, index: usize, cell: usize) -> f64 {
        self.scalars.get(index).map_or(0.0, |s| s[cell])
    }
}

/// epsilon / k, guarded against vanishing k
pub fn mean_frequency(k: f64, epsilon: f64) -> f64 {
    if k > f64::EPSILON { epsilon / k } else { 0.0 }
}
