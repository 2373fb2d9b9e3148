//! Evaluation and derivative checks for the expression graph.

use approx::assert_relative_eq;
use wombat::{Expr, NumOps, Param, Var};

#[test]
fn addition() {
    let x = Var::new(2.5);
    let y = Var::new(-3.7);
    let p = Param::new(8.6);

    let e = &x + &y + &p + 3.3;
    assert_relative_eq!(e.evaluate(), 2.5 - 3.7 + 8.6 + 3.3, max_relative = 1e-12);
    assert_eq!(e.ad(&x), 1.0);
    assert_eq!(e.ad(&y), 1.0);
}

#[test]
fn subtraction() {
    let x = Var::new(2.5);
    let y = Var::new(-3.7);
    let e = &x - &y;
    assert_relative_eq!(e.evaluate(), 6.2, max_relative = 1e-12);
    assert_eq!(e.ad(&x), 1.0);
    assert_eq!(e.ad(&y), -1.0);
}

#[test]
fn multiplication() {
    let x = Var::new(2.5);
    let y = Var::new(-3.7);
    let e = &x * &y;
    assert_relative_eq!(e.evaluate(), 2.5 * -3.7, max_relative = 1e-12);
    assert_relative_eq!(e.ad(&x), -3.7, max_relative = 1e-12);
    assert_relative_eq!(e.ad(&y), 2.5, max_relative = 1e-12);
    assert_relative_eq!(e.ad2(&x, &y), 1.0, max_relative = 1e-12);
    assert_eq!(e.ad2(&x, &x), 0.0);
}

#[test]
fn multiplication_by_parameter_collapses() {
    let x = Var::new(2.5);
    let p = Param::new(4.0);
    let e = &p * &x;
    assert_relative_eq!(e.evaluate(), 10.0, max_relative = 1e-12);
    assert_relative_eq!(e.ad(&x), 4.0, max_relative = 1e-12);
    p.set_value(6.0);
    assert_relative_eq!(e.ad(&x), 6.0, max_relative = 1e-12);
}

#[test]
fn division() {
    let x = Var::new(2.5);
    let y = Var::new(-3.7);
    let e = &x / &y;
    assert_relative_eq!(e.evaluate(), 2.5 / -3.7, max_relative = 1e-12);
    assert_relative_eq!(e.ad(&x), 1.0 / -3.7, max_relative = 1e-12);
    assert_relative_eq!(e.ad(&y), -2.5 / (3.7 * 3.7), max_relative = 1e-12);
    // d2/dxdy (x/y) = -1/y^2
    assert_relative_eq!(e.ad2(&x, &y), -1.0 / (3.7 * 3.7), max_relative = 1e-12);
    // d2/dy2 (x/y) = 2x/y^3
    assert_relative_eq!(
        e.ad2(&y, &y),
        2.0 * 2.5 / (-3.7_f64).powi(3),
        max_relative = 1e-12
    );
}

#[test]
fn power_with_constant_exponent() {
    let x = Var::new(2.5);
    let e = Expr::from(&x).pow(3.0);
    assert_relative_eq!(e.evaluate(), 2.5_f64.powi(3), max_relative = 1e-12);
    assert_relative_eq!(e.ad(&x), 3.0 * 2.5_f64.powi(2), max_relative = 1e-12);
    assert_relative_eq!(e.ad2(&x, &x), 6.0 * 2.5, max_relative = 1e-12);
}

#[test]
fn power_with_variable_exponent() {
    let x = Var::new(2.5);
    let y = Var::new(-3.7);
    let e = Expr::from(&x).pow(&y);
    assert_relative_eq!(e.evaluate(), 2.5_f64.powf(-3.7), max_relative = 1e-12);
    assert_relative_eq!(
        e.ad(&x),
        -3.7 * 2.5_f64.powf(-4.7),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        e.ad(&y),
        2.5_f64.powf(-3.7) * 2.5_f64.ln(),
        max_relative = 1e-12
    );
}

#[test]
fn elementary_functions() {
    let x = Var::new(0.5);

    assert_relative_eq!((&x).exp().ad(&x), 0.5_f64.exp(), max_relative = 1e-12);
    assert_relative_eq!((&x).ln().ad(&x), 2.0, max_relative = 1e-12);
    assert_relative_eq!((&x).sin().ad(&x), 0.5_f64.cos(), max_relative = 1e-12);
    assert_relative_eq!((&x).cos().ad(&x), -(0.5_f64.sin()), max_relative = 1e-12);
    assert_relative_eq!(
        (&x).tan().ad(&x),
        1.0 / (0.5_f64.cos() * 0.5_f64.cos()),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        (&x).asin().ad(&x),
        1.0 / (1.0 - 0.25_f64).sqrt(),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        (&x).acos().ad(&x),
        -1.0 / (1.0 - 0.25_f64).sqrt(),
        max_relative = 1e-12
    );
    assert_relative_eq!((&x).atan().ad(&x), 1.0 / 1.25, max_relative = 1e-12);

    // Second partials through a chain.
    assert_relative_eq!(
        (&x).sin().ad2(&x, &x),
        -(0.5_f64.sin()),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        (&x).exp().ad2(&x, &x),
        0.5_f64.exp(),
        max_relative = 1e-12
    );
}

#[test]
fn abs_and_sign() {
    let x = Var::new(-2.0);
    let e = (&x).abs();
    assert_eq!(e.evaluate(), 2.0);
    assert_eq!(e.ad(&x), -1.0);
    x.set_value(3.0);
    assert_eq!(e.ad(&x), 1.0);

    let s = (&x).sign();
    assert_eq!(s.evaluate(), 1.0);
    assert_eq!(s.ad(&x), 0.0);
    x.set_value(-0.5);
    assert_eq!(s.evaluate(), -1.0);
}

#[test]
fn constant_fold_scales_into_the_summation() {
    let x = Var::new(4.0);
    let e = (Expr::from(2.0) + 3.0) * &x;
    let s = e.as_sum().expect("folded scale should be affine");
    assert_eq!(s.constant(), 0.0);
    assert_eq!(s.terms().len(), 1);
    assert_eq!(s.terms()[0].coef, 5.0);
    assert!(matches!(s.terms()[0].expr, Expr::Var(_)));
    assert_eq!(e.evaluate(), 5.0 * x.value());
}

#[test]
fn evaluation_is_idempotent() {
    let x = Var::new(1.3);
    let y = Var::new(-0.7);
    let e = 100.0 * (Expr::from(&y) - Expr::from(&x).pow(2.0)).pow(2.0)
        + (1.0 - &x).pow(2.0);
    let v1 = e.evaluate();
    let v2 = e.evaluate();
    assert_eq!(v1.to_bits(), v2.to_bits());
    let d1 = e.ad(&x);
    let d2 = e.ad(&x);
    assert_eq!(d1.to_bits(), d2.to_bits());
    let h1 = e.ad2(&x, &y);
    let h2 = e.ad2(&x, &y);
    assert_eq!(h1.to_bits(), h2.to_bits());
}

#[test]
fn no_dependency_means_zero_derivative() {
    let x = Var::new(1.1);
    let y = Var::new(2.2);
    let z = Var::new(3.3);
    let e = &x * &y + (&x).sin();
    assert!(!e.has_ad(&z));
    assert_eq!(e.ad(&z), 0.0);
    assert_eq!(e.ad2(&z, &x), 0.0);
    assert_eq!(e.ad2(&z, &z), 0.0);
}

#[test]
fn summation_first_and_second_partials() {
    let x = Var::new(2.0);
    let y = Var::new(5.0);
    // 7 + 3 x^2 - 2 x y
    let e = 7.0 + 3.0 * Expr::from(&x).pow(2.0) - 2.0 * (Expr::from(&x) * &y);
    assert_relative_eq!(e.evaluate(), 7.0 + 12.0 - 20.0, max_relative = 1e-12);
    assert_relative_eq!(e.ad(&x), 6.0 * 2.0 - 2.0 * 5.0, max_relative = 1e-12);
    assert_relative_eq!(e.ad(&y), -4.0, max_relative = 1e-12);
    assert_relative_eq!(e.ad2(&x, &x), 6.0, max_relative = 1e-12);
    assert_relative_eq!(e.ad2(&x, &y), -2.0, max_relative = 1e-12);
    assert_eq!(e.ad2(&y, &y), 0.0);
}
