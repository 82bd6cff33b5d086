use roots::{find_root_brent, SimpleConvergency};

/// Walk from `start` down to `stop` (inclusive) in steps of `step`, returning the first value
/// for which `predicate` holds.
pub(crate) fn first_descending(
    start: f64,
    stop: f64,
    step: f64,
    predicate: impl Fn(f64) -> bool,
) -> Option<f64> {
    debug_assert!(step > 0.);
    let steps = ((start - stop) / step).floor() as i64;
    (0..=steps)
        .map(|i| start - i as f64 * step)
        .find(|&x| predicate(x))
}

/// Find a root of `func` bracketed by `[a, b]` with Brent's method.
pub(crate) fn root_in_bracket(
    func: impl Fn(f64) -> f64,
    a: f64,
    b: f64,
    tol: Option<f64>,
) -> anyhow::Result<f64> {
    let mut convergency = SimpleConvergency {
        eps: tol.unwrap_or(1e-9),
        max_iter: 100,
    };

    find_root_brent::<f64, _>(a, b, |x| func(x), &mut convergency)
        .map_err(|e| anyhow::anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::*;

    #[rstest]
    fn should_find_first_value_walking_down() {
        assert_eq!(first_descending(60., -20., 1., |t| t <= 12.5), Some(12.));
    }

    #[rstest]
    fn should_include_the_stop_value() {
        assert_eq!(first_descending(60., -20., 1., |t| t <= -20.), Some(-20.));
    }

    #[rstest]
    fn should_return_none_when_predicate_never_holds() {
        assert_eq!(first_descending(60., -20., 1., |_| false), None);
    }

    #[rstest]
    fn should_find_root_of_piecewise_linear_function() {
        let func = |k: f64| (3. * k).min(9.) - 4.5;
        let root = root_in_bracket(func, 0., 10., None).unwrap();
        assert_abs_diff_eq!(root, 1.5, epsilon = 1e-6);
    }
}
