//! Production on the surface of a sphere balanced by decay in its volume.
//!
//! At steady state every molecule made on the membrane decays in the bulk,
//! so the mean concentration is `k_kin · area / (k_p · volume)`, which is
//! `3 k_kin / (k_p R)` for a sphere of radius `R`.

mod common;

use approx::assert_relative_eq;
use reacdiff::Model;
use reacdiff_core::{Compartment, Config, Parameter, Reaction, Species};

use common::{container, half_disc};

const K_KIN: f64 = 50.0;
const K_P: f64 = 10.0;

fn sphere(radius: f64) -> Model {
    let mut config = Config::new(15.0, 1.0);
    config.flags.axisymmetric_model = true;
    Model::new(
        container(vec![
            Parameter::new("k_kin", K_KIN, "uM*um/s").unwrap(),
            Parameter::new("k_p", K_P, "1/s").unwrap(),
        ]),
        container(vec![Species::new("c", 0.0, "uM", 1.0, "um^2/s", "Cyto").unwrap()]),
        container(vec![
            Compartment::new("Cyto", 2, "um", 1).unwrap(),
            Compartment::new("PM", 1, "um", 2).unwrap(),
        ]),
        container(vec![
            Reaction::new("production", Vec::<&str>::new(), ["c"])
                .unwrap()
                .with_rates(Some("k_kin"), None)
                .restricted_to_domain("PM"),
            Reaction::new("decay", ["c"], Vec::<&str>::new())
                .unwrap()
                .forward_only()
                .with_params([("on", "k_p")]),
        ]),
        config,
        half_disc(radius, 8, 24),
    )
}

#[test]
fn steady_state_mean_matches_the_analytical_value() {
    let radii: Vec<f64> = (0..10)
        .map(|i| 10f64.powf(-0.5 + f64::from(i) / 9.0))
        .collect();
    for radius in radii {
        let mut model = sphere(radius);
        model.initialize().unwrap();
        while model.phase() == reacdiff::Phase::Ready {
            model.step().unwrap();
        }
        let volume = model.measure("Cyto").unwrap();
        let mean = model.integrate("c").unwrap() / volume;

        let discrete = K_KIN * model.measure("PM").unwrap() / (K_P * volume);
        assert_relative_eq!(mean, discrete, max_relative = 1e-6);
        let analytical = 3.0 * K_KIN / (K_P * radius);
        assert_relative_eq!(mean, analytical, max_relative = 0.01);
    }
}

#[test]
fn axisymmetric_measures_approximate_the_sphere() {
    let radius = 2.0;
    let mut model = sphere(radius);
    model.initialize().unwrap();
    // Integrals carry the radial weight without the factor 2π.
    let volume = 2.0 / 3.0 * radius.powi(3);
    let area = 2.0 * radius.powi(2);
    assert_relative_eq!(model.measure("Cyto").unwrap(), volume, max_relative = 0.01);
    assert_relative_eq!(model.measure("PM").unwrap(), area, max_relative = 0.01);
}
