//! The two-species Schnakenberg system on a `10 × 1` strip.
//!
//! With `a = 0.1`, `b = 1` and a diffusion ratio of 20 the homogeneous state
//! `u = a + b`, `v = b / (a + b)²` is Turing unstable for wavenumbers
//! `k² ∈ [0.09, 0.67]`, so the strip carries the first two modes and a
//! seeded perturbation grows into a stationary pattern.

mod common;

use approx::assert_relative_eq;
use rand::{Rng, SeedableRng, rngs::StdRng};
use reacdiff::{Model, Phase, assembly::Partitioned};
use reacdiff_core::{Compartment, Config, Parameter, Reaction, Species};

use common::{container, rectangle};

const A: f64 = 0.1;
const B: f64 = 1.0;
const WIDTH: f64 = 10.0;

/// `|u|` at `t = 50` from seed 7, recorded from a run of this setup.
const PATTERN_L2_NORM: f64 = 3.854_098_192;

fn schnakenberg(final_t: f64) -> Model {
    let u0 = A + B;
    let v0 = B / (u0 * u0);
    let mut config = Config::new(final_t, 0.5);
    config.solver.newton.abs_tol = 1e-12;
    config.solver.newton.rel_tol = 1e-12;
    Model::new(
        container(vec![
            Parameter::new("a", A, "uM/s").unwrap(),
            Parameter::new("b", B, "uM/s").unwrap(),
            Parameter::new("k1", 1.0, "1/s").unwrap(),
            Parameter::new("k3", 1.0, "1/(uM^2*s)").unwrap(),
        ]),
        container(vec![
            Species::new("u", u0, "uM", 1.0, "um^2/s", "Cyto").unwrap(),
            Species::new("v", v0, "uM", 20.0, "um^2/s", "Cyto").unwrap(),
        ]),
        container(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]),
        container(vec![
            Reaction::new("u_kinetics", Vec::<&str>::new(), ["u"])
                .unwrap()
                .with_rates(Some("a - k1*u + k3*u^2*v"), None)
                .with_species([("v", "v")]),
            Reaction::new("v_kinetics", Vec::<&str>::new(), ["v"])
                .unwrap()
                .with_rates(Some("b - k3*u^2*v"), None)
                .with_species([("u", "u")]),
        ]),
        config,
        rectangle(20, 2, WIDTH, |_| 1, |_| 0),
    )
}

/// Scales `u` by a uniform factor in `[0.9, 1.1)` per vertex.
fn perturbed(final_t: f64, seed: u64) -> Model {
    let mut model = schnakenberg(final_t);
    model.initialize().unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    model
        .map_species("u", |_, value| value * (1.0 + rng.gen_range(-0.1..0.1)))
        .unwrap();
    model
}

fn run(model: &mut Model) {
    while model.phase() == Phase::Ready {
        model.step().unwrap();
    }
}

#[test]
fn seeded_perturbation_grows_into_a_pattern() {
    let mut model = perturbed(50.0, 7);
    let homogeneous = (A + B) * WIDTH.sqrt();
    assert_relative_eq!(model.l2_norm("u").unwrap(), homogeneous, max_relative = 1e-2);

    run(&mut model);
    assert_relative_eq!(model.t(), 50.0, epsilon = 1e-12);
    assert_relative_eq!(model.l2_norm("u").unwrap(), PATTERN_L2_NORM, max_relative = 1e-4);

    let stats = model.stats("u").unwrap();
    assert!(stats.min < 0.5 && stats.max > 1.9);
    assert!(model.species_values("v").unwrap().iter().all(|&v| v > 0.0));
}

#[test]
fn runs_are_reproducible_for_a_fixed_seed() {
    let mut first = perturbed(3.0, 42);
    let mut second = perturbed(3.0, 42);
    second.set_backend(Partitioned::new(3));
    run(&mut first);
    run(&mut second);

    let a = first.species_values("u").unwrap();
    let b = second.species_values("u").unwrap();
    for (x, y) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *y, max_relative = 1e-8);
    }
    assert_relative_eq!(
        first.l2_norm("u").unwrap(),
        second.l2_norm("u").unwrap(),
        max_relative = 1e-8
    );
}
