//! Compiled stack-machine evaluator: residuals and CSR Jacobians.

use approx::assert_relative_eq;
use wombat::rpn::Evaluator;
use wombat::{ConditionalConstraint, Constraint, Expr, NumOps, Param, StructureError, Var};

#[test]
fn evaluate_requires_structure() {
    let mut ev = Evaluator::new();
    let x = Var::new(1.0);
    ev.add_var(&x);
    ev.add_constraint(Constraint::equality(Expr::from(&x), 0.0));

    let mut out = [0.0];
    let err = ev.evaluate(&mut out).unwrap_err();
    assert_eq!(err, StructureError::StructureNotSet);
    assert!(err.to_string().contains("structure not set"));

    ev.set_structure().unwrap();
    ev.evaluate(&mut out).unwrap();

    ev.release_structure();
    assert_eq!(
        ev.evaluate(&mut out).unwrap_err(),
        StructureError::StructureNotSet
    );
}

#[test]
fn registry_mutation_drops_the_structure() {
    let mut ev = Evaluator::new();
    let x = Var::new(1.0);
    ev.add_var(&x);
    ev.add_constraint(Constraint::equality(Expr::from(&x), 0.0));
    ev.set_structure().unwrap();
    assert!(ev.is_structure_set());

    let y = Var::new(2.0);
    ev.add_var(&y);
    assert!(!ev.is_structure_set());
}

#[test]
fn residuals_and_csr_jacobian() {
    let mut ev = Evaluator::new();
    let x = Var::new(2.0);
    let y = Var::new(5.0);
    ev.add_var(&x);
    ev.add_var(&y);

    let c0 = Constraint::new(&x + &y, -1.0e20, 1.0);
    let c1 = Constraint::equality(Expr::from(&x) * &y, 0.5);
    ev.add_constraint(&c0);
    ev.add_constraint(&c1);
    ev.set_structure().unwrap();
    assert_eq!(ev.nnz().unwrap(), 4);

    let mut out = [0.0; 2];
    ev.evaluate(&mut out).unwrap();
    assert_relative_eq!(out[0], 7.0, max_relative = 1e-12);
    assert_relative_eq!(out[1], 10.0, max_relative = 1e-12);

    let mut values = [0.0; 4];
    let mut col_ndx = [0usize; 4];
    let mut row_nnz = [0usize; 3];
    ev.evaluate_csr_jacobian(&mut values, &mut col_ndx, &mut row_nnz)
        .unwrap();
    assert_eq!(row_nnz, [0, 2, 4]);
    assert_eq!(col_ndx, [0, 1, 0, 1]);
    assert_relative_eq!(values[0], 1.0, max_relative = 1e-12);
    assert_relative_eq!(values[1], 1.0, max_relative = 1e-12);
    assert_relative_eq!(values[2], 5.0, max_relative = 1e-12); // d(xy)/dx = y
    assert_relative_eq!(values[3], 2.0, max_relative = 1e-12); // d(xy)/dy = x
}

#[test]
fn conditional_csr_round_trip() {
    let mut ev = Evaluator::new();
    let x = Var::new(0.5);
    let y = Var::new(3.0);
    ev.add_var(&x);
    ev.add_var(&y);

    // if x - 1 <= 0: x^2 + y   else: x * y
    let ladder = ConditionalConstraint::new(
        vec![&x - 1.0],
        vec![Expr::from(&x).pow(2.0) + &y, Expr::from(&x) * &y],
        0.0,
        0.0,
    );
    ev.add_constraint(&ladder);
    ev.set_structure().unwrap();

    let mut row_nnz = [0usize; 2];
    let mut col_ndx = [0usize; 2];
    let mut values = [0.0; 2];

    // First branch active at x = 0.5.
    let mut out = [0.0];
    ev.evaluate(&mut out).unwrap();
    assert_relative_eq!(out[0], 0.25 + 3.0, max_relative = 1e-12);
    ev.evaluate_csr_jacobian(&mut values, &mut col_ndx, &mut row_nnz)
        .unwrap();
    assert_eq!(row_nnz, [0, 2]);
    assert_eq!(col_ndx, [0, 1]);
    assert_relative_eq!(values[0], 1.0, max_relative = 1e-12); // 2x
    assert_relative_eq!(values[1], 1.0, max_relative = 1e-12);

    // Else branch active at x = 2: same pattern, new values.
    x.set_value(2.0);
    ev.evaluate(&mut out).unwrap();
    assert_relative_eq!(out[0], 6.0, max_relative = 1e-12);
    ev.evaluate_csr_jacobian(&mut values, &mut col_ndx, &mut row_nnz)
        .unwrap();
    assert_eq!(row_nnz, [0, 2]);
    assert_eq!(col_ndx, [0, 1]);
    assert_relative_eq!(values[0], 3.0, max_relative = 1e-12); // y
    assert_relative_eq!(values[1], 2.0, max_relative = 1e-12); // x
}

#[test]
fn parameters_update_without_recompiling() {
    let mut ev = Evaluator::new();
    let x = Var::new(2.0);
    let p = Param::new(3.0);
    ev.add_var(&x);
    ev.add_param(&p);
    ev.add_constraint(Constraint::equality(Expr::from(&p) * &x, 0.0));
    ev.set_structure().unwrap();

    let mut out = [0.0];
    ev.evaluate(&mut out).unwrap();
    assert_relative_eq!(out[0], 6.0, max_relative = 1e-12);

    p.set_value(10.0);
    ev.evaluate(&mut out).unwrap();
    assert_relative_eq!(out[0], 20.0, max_relative = 1e-12);
}

#[test]
fn unary_functions_compile() {
    let mut ev = Evaluator::new();
    let x = Var::new(0.5);
    ev.add_var(&x);
    ev.add_constraint(Constraint::equality((&x).sin() + (&x).exp(), 0.0));
    ev.set_structure().unwrap();

    let mut out = [0.0];
    ev.evaluate(&mut out).unwrap();
    assert_relative_eq!(out[0], 0.5_f64.sin() + 0.5_f64.exp(), max_relative = 1e-12);

    let mut values = [0.0];
    let mut col_ndx = [0usize; 1];
    let mut row_nnz = [0usize; 2];
    ev.evaluate_csr_jacobian(&mut values, &mut col_ndx, &mut row_nnz)
        .unwrap();
    assert_relative_eq!(
        values[0],
        0.5_f64.cos() + 0.5_f64.exp(),
        max_relative = 1e-12
    );
}

#[test]
fn get_x_and_load_var_values_round_trip() {
    let mut ev = Evaluator::new();
    let x = Var::new(1.0);
    let y = Var::new(2.0);
    ev.add_var(&x);
    ev.add_var(&y);
    ev.add_constraint(Constraint::equality(&x + &y, 0.0));
    ev.set_structure().unwrap();

    let mut buf = [0.0; 2];
    ev.get_x(&mut buf).unwrap();
    assert_eq!(buf, [1.0, 2.0]);

    ev.load_var_values(&[7.0, 8.0]).unwrap();
    assert_eq!(x.value(), 7.0);
    assert_eq!(y.value(), 8.0);

    let mut out = [0.0];
    ev.evaluate(&mut out).unwrap();
    assert_eq!(out[0], 15.0);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_evaluation_matches_serial() {
    let mut ev = Evaluator::new();
    let x = Var::new(1.3);
    let y = Var::new(-0.4);
    ev.add_var(&x);
    ev.add_var(&y);

    ev.add_constraint(Constraint::equality(Expr::from(&x).pow(2.0) + &y, 0.0));
    ev.add_constraint(Constraint::equality(Expr::from(&x) * &y, 0.0));
    ev.add_constraint(Constraint::equality((&x).sin() - (&y).cos(), 0.0));
    ev.add_constraint(ConditionalConstraint::new(
        vec![&x - 1.0],
        vec![Expr::from(&x).pow(2.0), Expr::from(&x) * &y],
        0.0,
        0.0,
    ));
    ev.set_structure().unwrap();

    let m = ev.num_constraints();
    let nnz = ev.nnz().unwrap();

    let mut serial = vec![0.0; m];
    let mut par = vec![0.0; m];
    ev.evaluate(&mut serial).unwrap();
    ev.evaluate_par(&mut par).unwrap();
    assert_eq!(serial, par);

    let mut v1 = vec![0.0; nnz];
    let mut c1 = vec![0usize; nnz];
    let mut r1 = vec![0usize; m + 1];
    let mut v2 = vec![0.0; nnz];
    let mut c2 = vec![0usize; nnz];
    let mut r2 = vec![0usize; m + 1];
    ev.evaluate_csr_jacobian(&mut v1, &mut c1, &mut r1).unwrap();
    ev.evaluate_csr_jacobian_par(&mut v2, &mut c2, &mut r2)
        .unwrap();
    assert_eq!(v1, v2);
    assert_eq!(c1, c2);
    assert_eq!(r1, r2);
}
