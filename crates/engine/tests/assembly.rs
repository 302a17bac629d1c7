mod common;

use approx::assert_relative_eq;
use reacdiff::{
    Error, Model, Phase,
    assembly::{Partitioned, Serial},
    output::MemorySink,
};
use reacdiff_core::{
    AssemblyError, Compartment, Config, ConfigurationError, Parameter, Reaction, Species, Unit,
};

use common::{binding_model, container, square, with_cell_extra};

/// Two volumes side by side; a membrane on the left edge bounds only the
/// left one.
fn two_volumes(declare_nonadjacency: bool, reactions: Vec<Reaction>) -> Model {
    let mesh = square(
        4,
        |c| if c[0] < 0.5 { 1 } else { 2 },
        |p| if p[0] < 1e-9 { 11 } else { 0 },
    );
    let mut membrane = Compartment::new("LeftPM", 1, "um", 11).unwrap();
    if declare_nonadjacency {
        membrane = membrane.with_nonadjacent(["Right"]);
    }
    Model::new(
        container(vec![
            Parameter::new("kf", 1.5, "um/s").unwrap(),
            Parameter::new("kr", 0.5, "1/s").unwrap(),
            Parameter::new("kd", 0.2, "1/s").unwrap(),
        ]),
        container(vec![
            Species::new("A", 1.0, "uM", 0.3, "um^2/s", "Left")
                .unwrap()
                .with_initial_expression("1 + y")
                .unwrap(),
            Species::new("B", 0.5, "uM*um", 0.1, "um^2/s", "LeftPM").unwrap(),
            Species::new("C", 2.0, "uM", 0.3, "um^2/s", "Right").unwrap(),
        ]),
        container(vec![
            Compartment::new("Left", 2, "um", 1).unwrap(),
            Compartment::new("Right", 2, "um", 2).unwrap(),
            membrane,
        ]),
        container(reactions),
        Config::new(0.6, 0.2),
        mesh,
    )
}

fn binding_and_decay() -> Vec<Reaction> {
    vec![
        Reaction::new("bind", ["A"], ["B"])
            .unwrap()
            .with_params([("on", "kf"), ("off", "kr")]),
        Reaction::new("decay", ["C"], Vec::<&str>::new())
            .unwrap()
            .forward_only()
            .with_params([("on", "kd")]),
    ]
}

#[test]
fn nonadjacency_declarations_do_not_change_results() {
    let mut pruned = two_volumes(true, binding_and_decay());
    let mut full = two_volumes(false, binding_and_decay());
    for model in [&mut pruned, &mut full] {
        model.initialize().unwrap();
        while model.phase() == Phase::Ready {
            model.step().unwrap();
        }
    }
    for species in ["A", "B", "C"] {
        let a = pruned.species_values(species).unwrap();
        let b = full.species_values(species).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(*x, *y, max_relative = 1e-12);
        }
    }
    // C decays on its own: backward Euler with three steps of 0.2.
    let expected = 2.0 / (1.0 + 0.2 * 0.2_f64).powi(3);
    assert_relative_eq!(pruned.stats("C").unwrap().mean, expected, max_relative = 1e-9);
}

#[test]
fn reactions_across_nonadjacent_compartments_are_rejected() {
    for declared in [true, false] {
        let mut reactions = binding_and_decay();
        reactions.push(
            Reaction::new("leak", ["C"], ["B"])
                .unwrap()
                .with_params([("on", "kf"), ("off", "kr")]),
        );
        let mut model = two_volumes(declared, reactions);
        let err = model.initialize().unwrap_err();
        assert!(
            matches!(err, Error::Assembly(AssemblyError::NotAdjacent { ref reaction, .. }) if reaction == "leak"),
            "{err}"
        );
        assert_eq!(model.phase(), Phase::Uninitialized);
    }
}

#[test]
fn a_reaction_between_two_volumes_is_ambiguous() {
    let mut reactions = binding_and_decay();
    reactions.push(
        Reaction::new("exchange", ["A"], ["C"])
            .unwrap()
            .with_params([("on", "kd"), ("off", "kd")]),
    );
    let err = two_volumes(false, reactions).initialize().unwrap_err();
    assert!(matches!(
        err,
        Error::Assembly(AssemblyError::AmbiguousDomain { ref compartments, .. })
            if compartments == &["Left".to_owned(), "Right".to_owned()]
    ));
}

#[test]
fn serial_and_partitioned_assembly_agree() {
    let mut model = binding_model(6, Config::new(1.0, 0.1));
    model.initialize().unwrap();
    model.step().unwrap();

    let serial = model.residual(&Serial, 0.05).unwrap();
    for partitions in [1, 2, 5, 64] {
        let backend = Partitioned::new(partitions);
        let partitioned = model.residual(&backend, 0.05).unwrap();
        let scale = serial.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        for (a, b) in serial.iter().zip(partitioned.iter()) {
            assert!((a - b).abs() <= 1e-13 * scale.max(1.0));
        }

        let js = model.jacobian(&Serial, 0.05).unwrap();
        let jp = model.jacobian(&backend, 0.05).unwrap();
        assert_eq!(js.len(), jp.len());
        for (rs, rp) in js.iter().zip(&jp) {
            assert_eq!(rs.len(), rp.len());
            for ((cs, vs), (cp, vp)) in rs.iter().zip(rp) {
                assert_eq!(cs, cp);
                assert_relative_eq!(*vs, *vp, epsilon = 1e-12, max_relative = 1e-12);
            }
        }
    }

    let norms = model.residual_norms(0.05).unwrap();
    let names: Vec<&str> = norms.iter().map(|(c, _)| c.as_str()).collect();
    assert_eq!(names, vec!["Cyto", "PM"]);
    let total: f64 = norms.iter().map(|(_, n)| n * n).sum::<f64>().sqrt();
    let direct = serial.iter().map(|v| v * v).sum::<f64>().sqrt();
    assert_relative_eq!(total, direct, max_relative = 1e-12);
}

#[test]
fn mismatched_rate_units_are_assembly_errors() {
    // A first-order decay of `A` in uM needs a rate constant in 1/s.
    for unit in ["um/s", "1/um", "s", "uM", "1/(uM*s)", "1/min^2"] {
        let mut model = Model::new(
            container(vec![Parameter::new("k", 1.0, unit).unwrap()]),
            container(vec![Species::new("A", 1.0, "uM", 1.0, "um^2/s", "Cyto").unwrap()]),
            container(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]),
            container(vec![
                Reaction::new("decay", ["A"], Vec::<&str>::new())
                    .unwrap()
                    .forward_only()
                    .with_params([("on", "k")]),
            ]),
            Config::new(1.0, 0.1),
            square(2, |_| 1, |_| 0),
        );
        let err = model.initialize().unwrap_err();
        assert!(
            matches!(err, Error::Assembly(AssemblyError::UnitMismatch { ref species, .. }) if species == "A"),
            "unit `{unit}`: {err}"
        );
    }

    // Both directions of a membrane binding must have the same unit.
    let mut model = binding_model(2, Config::new(1.0, 0.1));
    model.parameters_mut().get_mut("kf").unwrap().unit = Unit::parse("1/s").unwrap();
    let err = model.initialize().unwrap_err();
    assert!(
        matches!(err, Error::Assembly(AssemblyError::InconsistentUnits { ref reaction, .. }) if reaction == "bind"),
        "{err}"
    );
}

#[test]
fn compatible_scales_are_converted() {
    // 60 per minute is 1 per second.
    let mut model = Model::new(
        container(vec![Parameter::new("k", 60.0, "1/min").unwrap()]),
        container(vec![Species::new("A", 1.0, "uM", 0.0, "um^2/s", "Cyto").unwrap()]),
        container(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]),
        container(vec![
            Reaction::new("decay", ["A"], Vec::<&str>::new())
                .unwrap()
                .forward_only()
                .with_params([("on", "k")]),
        ]),
        Config::new(0.5, 0.5),
        square(2, |_| 1, |_| 0),
    );
    model.initialize().unwrap();
    model.step().unwrap();
    assert_relative_eq!(model.stats("A").unwrap().mean, 1.0 / 1.5, max_relative = 1e-9);
}

#[test]
fn subdomain_restrictions_limit_species_and_reactions() {
    let mesh = with_cell_extra(square(4, |_| 1, |_| 0), "half", |c| i64::from(c[0] < 0.5));
    let mut model = Model::new(
        container(vec![Parameter::new("j", 1.0, "uM/s").unwrap()]),
        container(vec![
            Species::new("A", 0.0, "uM", 0.0, "um^2/s", "Cyto").unwrap(),
            Species::new("R", 1.0, "uM", 0.0, "um^2/s", "Cyto")
                .unwrap()
                .restricted_to("half", 1),
        ]),
        container(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]),
        container(vec![
            Reaction::new("source", Vec::<&str>::new(), ["A"])
                .unwrap()
                .with_rates(Some("j"), None)
                .restricted_to_subdomain("half", 1),
            Reaction::new("source_r", Vec::<&str>::new(), ["R"])
                .unwrap()
                .with_rates(Some("j"), None),
        ]),
        Config::new(0.5, 0.5),
        mesh,
    );
    model.initialize().unwrap();

    // R is pinned to zero right of the restriction.
    let coordinates = model.species_coordinates("R").unwrap().to_vec();
    let values = model.species_values("R").unwrap().to_owned();
    for (p, v) in coordinates.iter().zip(values.iter()) {
        let expected = if p[0] > 0.5 + 1e-9 { 0.0 } else { 1.0 };
        assert_relative_eq!(*v, expected);
    }

    model.step().unwrap();
    // The restricted source adds j·dt over half the square.
    assert_relative_eq!(model.integrate("A").unwrap(), 0.25, max_relative = 1e-9);
    let values = model.species_values("R").unwrap();
    for (p, v) in coordinates.iter().zip(values.iter()) {
        if p[0] > 0.5 + 1e-9 {
            assert_relative_eq!(*v, 0.0);
        }
    }
}

#[test]
fn missing_extra_markers_are_configuration_errors() {
    let mut model = Model::new(
        container(vec![Parameter::new("j", 1.0, "uM/s").unwrap()]),
        container(vec![Species::new("A", 0.0, "uM", 0.0, "um^2/s", "Cyto").unwrap()]),
        container(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]),
        container(vec![
            Reaction::new("source", Vec::<&str>::new(), ["A"])
                .unwrap()
                .with_rates(Some("j"), None)
                .restricted_to_subdomain("nowhere", 1),
        ]),
        Config::new(0.5, 0.5),
        square(2, |_| 1, |_| 0),
    );
    let err = model.initialize().unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::MissingExtraMarker { ref name }) if name == "nowhere"
    ));
}

#[test]
fn run_writes_every_species_after_every_step() {
    let mut model = binding_model(3, Config::new(0.3, 0.1));
    let mut sink = MemorySink::new();
    let reports = model.run(&mut sink).unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(model.phase(), Phase::Finished);
    assert_eq!(sink.frames().len(), 2 * 4);

    let steps: Vec<usize> = sink.species("B").map(|f| f.step).collect();
    assert_eq!(steps, vec![0, 1, 2, 3]);
    let last = sink.species("A").last().unwrap();
    assert_eq!(last.compartment, "Cyto");
    assert_relative_eq!(last.t, 0.3, epsilon = 1e-12);
    assert_eq!(last.values.len(), last.coordinates.len());
    assert_eq!(last.values, model.species_values("A").unwrap().to_vec());
}

#[test]
fn flux_scaling_only_changes_the_scaled_species() {
    let conversion = |scaling: Option<f64>| {
        let mut reaction = Reaction::new("convert", ["A"], ["P"])
            .unwrap()
            .forward_only()
            .with_params([("on", "kf")]);
        if let Some(factor) = scaling {
            reaction = reaction.with_flux_scaling("P", factor);
        }
        let mut model = Model::new(
            container(vec![Parameter::new("kf", 1.0, "1/s").unwrap()]),
            container(vec![
                Species::new("A", 1.0, "uM", 0.0, "um^2/s", "Cyto").unwrap(),
                Species::new("P", 0.0, "uM", 0.0, "um^2/s", "Cyto").unwrap(),
            ]),
            container(vec![Compartment::new("Cyto", 2, "um", 1).unwrap()]),
            container(vec![reaction]),
            Config::new(0.5, 0.5),
            square(2, |_| 1, |_| 0),
        );
        model.initialize().unwrap();
        model.step().unwrap();
        model
    };

    let plain = conversion(None);
    let scaled = conversion(Some(0.25));

    // Backward Euler: A = 1 / (1 + k dt), and P gains what A loses.
    let a = 1.0 / 1.5;
    for model in [&plain, &scaled] {
        assert_relative_eq!(model.stats("A").unwrap().mean, a, max_relative = 1e-9);
    }
    assert_relative_eq!(plain.stats("P").unwrap().mean, 1.0 - a, max_relative = 1e-9);
    assert_relative_eq!(scaled.stats("P").unwrap().mean, 0.25 * (1.0 - a), max_relative = 1e-9);
    for value in scaled.species_values("P").unwrap() {
        assert_relative_eq!(*value, 0.25 * (1.0 - a), max_relative = 1e-9);
    }
}
