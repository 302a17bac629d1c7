/// Control actions supported by the Newton solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop iterating and report the solve as aborted.
    ///
    /// Time integrators treat an aborted solve like a diverged one: the
    /// state is discarded and the step may be retried.
    Abort,
}
