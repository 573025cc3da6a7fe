use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use strided_mateval::{
    accum_into, colwise_sum, copy_into, dot, evaluate, evaluate_with, evaluate_with_policy, fill,
    fold, fold_with_policy, map_into, maximum, mean, rowwise_sum, sum, DenseMat, EvalConfig,
    Expr, MatEvalError, MatView, MatViewMut, Max, Policy, SimdKind, Strategy, Sum,
};

fn policies() -> [Policy; 6] {
    [
        Policy::linear_vector(2),
        Policy::linear_vector(4),
        Policy::linear_scalar(),
        Policy::percol_vector(2),
        Policy::percol_vector(8),
        Policy::percol_scalar(),
    ]
}

fn random_buffer(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// The three layout families over one buffer: packed, column blocks with
/// padding, and a grid strided in both directions.
enum Kind {
    Dense,
    Block,
    Grid,
}

const KINDS: [Kind; 3] = [Kind::Dense, Kind::Block, Kind::Grid];

fn buffer_len(kind: &Kind, m: usize, n: usize) -> usize {
    match kind {
        Kind::Dense => m * n,
        Kind::Block => (m + 3) * n,
        Kind::Grid => (2 * m + 1) * n,
    }
}

fn view<'a>(kind: &Kind, data: &'a [f64], m: usize, n: usize) -> MatView<'a, f64> {
    match kind {
        Kind::Dense => MatView::dense(data, m, n).unwrap(),
        Kind::Block => MatView::block(data, m, n, m + 3).unwrap(),
        Kind::Grid => MatView::grid(data, m, n, 2, (2 * m + 1) as isize).unwrap(),
    }
}

fn view_mut<'a>(kind: &Kind, data: &'a mut [f64], m: usize, n: usize) -> MatViewMut<'a, f64> {
    match kind {
        Kind::Dense => MatViewMut::dense(data, m, n).unwrap(),
        Kind::Block => MatViewMut::block(data, m, n, m + 3).unwrap(),
        Kind::Grid => MatViewMut::grid(data, m, n, 2, (2 * m + 1) as isize).unwrap(),
    }
}

fn naive<F: Fn(usize, usize) -> f64>(m: usize, n: usize, f: F) -> DenseMat<f64> {
    DenseMat::from_fn(m, n, f)
}

fn assert_view_matches(actual: &MatView<'_, f64>, expected: &DenseMat<f64>) {
    assert_eq!(actual.shape(), expected.shape());
    for j in 0..expected.ncols() {
        for i in 0..expected.nrows() {
            assert_relative_eq!(actual.get(i, j), expected[(i, j)], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_copy_every_policy_and_layout() {
    let mut rng = StdRng::seed_from_u64(7);
    for (m, n) in [(1, 1), (1, 9), (9, 1), (3, 3), (7, 5), (16, 4), (33, 17)] {
        for src_kind in &KINDS {
            let src_data = random_buffer(&mut rng, buffer_len(src_kind, m, n));
            let src = view(src_kind, &src_data, m, n);
            let expected = naive(m, n, |i, j| src.get(i, j));

            for dst_kind in &KINDS {
                for policy in policies() {
                    let mut dst_data = vec![f64::NAN; buffer_len(dst_kind, m, n)];
                    let mut dst = view_mut(dst_kind, &mut dst_data, m, n);
                    evaluate_with_policy(&Expr::leaf(src), &mut dst, policy).unwrap();
                    assert_view_matches(&dst.as_view(), &expected);
                }
                let mut dst_data = vec![f64::NAN; buffer_len(dst_kind, m, n)];
                let mut dst = view_mut(dst_kind, &mut dst_data, m, n);
                copy_into(&mut dst, src).unwrap();
                assert_view_matches(&dst.as_view(), &expected);
            }
        }
    }
}

#[test]
fn test_destination_padding_is_untouched() {
    let (m, n) = (5, 4);
    let src = DenseMat::from_fn(m, n, |i, j| (i + j) as f64);
    for policy in policies() {
        let mut data = vec![-7.0; buffer_len(&Kind::Grid, m, n)];
        {
            let mut dst = view_mut(&Kind::Grid, &mut data, m, n);
            evaluate_with_policy(&Expr::leaf(src.view()), &mut dst, policy).unwrap();
        }
        let written = m * n;
        assert_eq!(data.iter().filter(|&&x| x == -7.0).count(), data.len() - written);
    }
}

#[test]
fn test_compound_expression_matches_reference() {
    let mut rng = StdRng::seed_from_u64(11);
    let (m, n) = (13, 6);
    let a_data = random_buffer(&mut rng, buffer_len(&Kind::Block, m, n));
    let b_data = random_buffer(&mut rng, buffer_len(&Kind::Grid, m, n));
    let c_data = random_buffer(&mut rng, m);
    let a = view(&Kind::Block, &a_data, m, n);
    let b = view(&Kind::Grid, &b_data, m, n);
    let c = MatView::dense(&c_data, m, 1).unwrap();

    let expected = naive(m, n, |i, j| {
        let (x, y, z) = (a.get(i, j), b.get(i, j), c.get(i, 0));
        let t = (x * y - z).abs() + x.max(y);
        if x > y {
            t
        } else {
            -t
        }
    });

    let t = || {
        (Expr::leaf(a) * Expr::leaf(b) - Expr::repeat_col(c, n)).abs()
            + Expr::leaf(a).max(Expr::leaf(b))
    };
    let build = || Expr::cond(Expr::leaf(a).elem_gt(Expr::leaf(b)), t(), -t());

    for policy in policies() {
        let mut out = DenseMat::zeros(m, n);
        evaluate_with_policy(&build(), &mut out.view_mut(), policy).unwrap();
        assert_view_matches(&out.view(), &expected);
    }
    for simd in [SimdKind::Scalar, SimdKind::Sse, SimdKind::Avx, SimdKind::Avx512] {
        let mut out = DenseMat::zeros(m, n);
        evaluate_with(&build(), &mut out.view_mut(), &EvalConfig::default().with_simd(simd))
            .unwrap();
        assert_view_matches(&out.view(), &expected);
    }
}

#[test]
fn test_repeat_col_fills_every_column() {
    let col_data = [1.0, 2.0, 3.0, 4.0, 5.0];
    let col = MatView::dense(&col_data, 5, 1).unwrap();
    for dst_kind in &KINDS {
        for policy in policies() {
            let mut data = vec![0.0; buffer_len(dst_kind, 5, 6)];
            let mut dst = view_mut(dst_kind, &mut data, 5, 6);
            evaluate_with_policy(&Expr::repeat_col(col, 6), &mut dst, policy).unwrap();
            assert_view_matches(&dst.as_view(), &naive(5, 6, |i, _| col_data[i]));
        }
    }
}

#[test]
fn test_repeat_strided_vectors() {
    let base = DenseMat::from_fn(4, 5, |i, j| (10 * i + j) as f64);
    let row = base.row(2);
    let col = base.view().t().column(3);
    assert!(!row.is_contiguous());

    for policy in policies() {
        let mut out = DenseMat::zeros(3, 5);
        evaluate_with_policy(&Expr::repeat_row(row, 3), &mut out.view_mut(), policy)
            .unwrap();
        assert_view_matches(&out.view(), &naive(3, 5, |_, j| (20 + j) as f64));

        let mut out = DenseMat::zeros(5, 2);
        evaluate_with_policy(&Expr::repeat_col(col, 2), &mut out.view_mut(), policy)
            .unwrap();
        assert_view_matches(&out.view(), &naive(5, 2, |i, _| (30 + i) as f64));
    }
}

#[test]
fn test_single_element_repeat_equals_fill() {
    let one = [2.5];
    let v = MatView::dense(&one, 1, 1).unwrap();
    for dst_kind in &KINDS {
        for policy in policies() {
            let mut a = vec![0.0; buffer_len(dst_kind, 4, 3)];
            let mut b = a.clone();
            evaluate_with_policy(
                &Expr::repeat_col(v, 3).map(|x| x),
                &mut view_mut(dst_kind, &mut a, 1, 3),
                policy,
            )
            .unwrap();
            fill(&mut view_mut(dst_kind, &mut b, 1, 3), 2.5);
            assert_eq!(a, b);

            let mut c = vec![0.0; buffer_len(dst_kind, 4, 3)];
            let mut d = c.clone();
            evaluate_with_policy(
                &Expr::repeat_row(v, 4),
                &mut view_mut(dst_kind, &mut c, 4, 1),
                policy,
            )
            .unwrap();
            fill(&mut view_mut(dst_kind, &mut d, 4, 1), 2.5);
            assert_eq!(c, d);
        }
    }
}

#[test]
fn test_empty_shapes_are_noops() {
    let data: Vec<f64> = Vec::new();
    for (m, n) in [(0, 0), (0, 5), (4, 0)] {
        let src = MatView::dense(&data, m, n).unwrap();
        let mut sentinel = vec![3.0; 4];
        let mut dst = MatViewMut::from_parts(&mut sentinel, m, n, 1, m as isize, 0).unwrap();
        for policy in policies() {
            evaluate_with_policy(&Expr::leaf(src), &mut dst, policy).unwrap();
            assert_eq!(fold_with_policy(&Sum, 1.25, &Expr::leaf(src), policy).unwrap(), 1.25);
        }
        evaluate(&Expr::leaf(src), &mut dst).unwrap();
        assert_eq!(sentinel, vec![3.0; 4]);
    }
}

#[test]
fn test_strided_row_as_operand_and_destination() {
    let m = DenseMat::from_fn(6, 8, |i, j| (10 * i + j) as f64);
    let src = m.view().row(2);
    assert!(!src.is_contiguous());

    for config in [EvalConfig::default(), EvalConfig::scalar()] {
        let mut buf = m.data().to_vec();
        // Row 4 of the same packed 6 x 8 layout.
        let mut dst = MatViewMut::from_parts(&mut buf, 1, 8, 1, 6, 4).unwrap();
        let e = Expr::leaf(src) * Expr::constant(2.0, 1, 8);
        let p = evaluate_with(&e, &mut dst, &config).unwrap();
        assert!(p.is_linear(), "{p:?}");
        for j in 0..8 {
            assert_eq!(buf[4 + 6 * j], 2.0 * (20 + j) as f64);
            // Neighbouring rows untouched.
            assert_eq!(buf[3 + 6 * j], (30 + j) as f64);
            assert_eq!(buf[5 + 6 * j], (50 + j) as f64);
        }
    }

    for policy in policies() {
        let mut buf = vec![0.0; 48];
        let mut dst = MatViewMut::from_parts(&mut buf, 1, 8, 1, 6, 1).unwrap();
        evaluate_with_policy(&Expr::leaf(src), &mut dst, policy).unwrap();
        assert_eq!(dst.as_view().to_vec(), src.to_vec());
    }

    let mut cols = DenseMat::zeros(1, 8);
    colwise_sum(&Expr::leaf(src), &mut cols.view_mut()).unwrap();
    assert_eq!(cols.data(), src.to_vec().as_slice());
    assert_eq!(sum(&Expr::leaf(src)).unwrap(), 8.0 * 20.0 + 28.0);
}

#[test]
fn test_strided_column_defaults_to_linear() {
    let data: Vec<f64> = (0..30).map(|x| x as f64).collect();
    let col = MatView::grid(&data, 9, 1, 3, 1).unwrap();
    let dense = DenseMat::from_fn(9, 1, |i, _| i as f64);
    let mut buf = vec![-1.0; 18];
    let mut dst = MatViewMut::from_parts(&mut buf, 9, 1, 2, 1, 0).unwrap();
    let p = evaluate_with(
        &(Expr::leaf(col) + Expr::leaf(dense.view())),
        &mut dst,
        &EvalConfig::default(),
    )
    .unwrap();
    assert_eq!(p, Policy::linear_vector(2));
    for i in 0..9 {
        assert_eq!(buf[2 * i], 4.0 * i as f64);
        assert_eq!(buf[2 * i + 1], -1.0);
    }
}

#[test]
fn test_empty_views_with_offset() {
    let data: [f64; 2] = [1.0, 2.0];
    let v = MatView::from_parts(&data, 0, 3, 1, 0, 5).unwrap();
    let e = Expr::leaf(v);
    assert_eq!(sum(&e).unwrap(), 0.0);
    assert_eq!(dot(v, v).unwrap(), 0.0);
    assert!(mean(&e).unwrap().is_nan());
    assert_eq!(maximum(&e).unwrap(), f64::NEG_INFINITY);

    let mut cols = DenseMat::filled(1, 3, 9.0);
    colwise_sum(&e, &mut cols.view_mut()).unwrap();
    assert_eq!(cols.data(), &[0.0, 0.0, 0.0]);

    let w = MatView::from_parts(&data, 4, 0, 1, 4, 11).unwrap();
    let mut rows = DenseMat::filled(4, 1, 9.0);
    rowwise_sum(&Expr::leaf(w), &mut rows.view_mut()).unwrap();
    assert_eq!(rows.data(), &[0.0; 4]);

    let mut sentinel = [5.0, 6.0];
    let mut dst = MatViewMut::from_parts(&mut sentinel, 0, 3, 1, 0, 8).unwrap();
    for policy in policies() {
        evaluate_with_policy(&e, &mut dst, policy).unwrap();
    }
    evaluate(&e, &mut dst).unwrap();
    fill(&mut dst, 1.0);
    accum_into(&e, &mut dst).unwrap();
    assert_eq!(sentinel, [5.0, 6.0]);
}

#[test]
fn test_shape_mismatch_reported_before_writes() {
    let a = DenseMat::filled(3, 4, 1.0);
    let b = DenseMat::filled(4, 3, 1.0);
    let mut d = DenseMat::filled(3, 4, 5.0);
    let err = evaluate(&(Expr::leaf(a.view()) + Expr::leaf(b.view())), &mut d.view_mut())
        .unwrap_err();
    assert!(matches!(err, MatEvalError::ShapeMismatch(_, _)));
    let err = accum_into(&Expr::leaf(b.view()), &mut d.view_mut()).unwrap_err();
    assert!(matches!(err, MatEvalError::ShapeMismatch(_, _)));
    assert!(d.data().iter().all(|&x| x == 5.0));
}

#[test]
fn test_fold_initial_value_composes() {
    let mut rng = StdRng::seed_from_u64(3);
    let (m, n) = (11, 9);
    let data = random_buffer(&mut rng, buffer_len(&Kind::Grid, m, n));
    let e = Expr::leaf(view(&Kind::Grid, &data, m, n)).sqr();
    for policy in policies() {
        let base = fold_with_policy(&Sum, 0.0, &e, policy).unwrap();
        assert_eq!(fold_with_policy(&Sum, 4.0, &e, policy).unwrap(), 4.0 + base);
    }
    let base = fold(&Sum, 0.0, &e).unwrap();
    assert_eq!(fold(&Sum, -2.0, &e).unwrap(), -2.0 + base);
}

#[test]
fn test_sum_matches_reference_within_rounding() {
    let mut rng = StdRng::seed_from_u64(5);
    let (m, n) = (37, 23);
    for kind in &KINDS {
        let data = random_buffer(&mut rng, buffer_len(kind, m, n));
        let v = view(kind, &data, m, n);
        let expected: f64 = v.to_vec().iter().sum();
        assert_relative_eq!(sum(&Expr::leaf(v)).unwrap(), expected, epsilon = 1e-10);
        for policy in policies() {
            let got = fold_with_policy(&Sum, 0.0, &Expr::leaf(v), policy).unwrap();
            assert_relative_eq!(got, expected, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_colwise_and_rowwise_on_grid() {
    let data: Vec<f64> = (0..60).map(|x| x as f64).collect();
    let g = MatView::grid(&data, 3, 3, 2, 20).unwrap();
    let mut cols = DenseMat::zeros(1, 3);
    colwise_sum(&Expr::leaf(g), &mut cols.view_mut()).unwrap();
    assert_eq!(cols.data(), &[6.0, 66.0, 126.0]);

    let mut rows = DenseMat::zeros(3, 1);
    rowwise_sum(&Expr::leaf(g), &mut rows.view_mut()).unwrap();
    assert_eq!(rows.data(), &[60.0, 66.0, 72.0]);
}

#[test]
fn test_map_into_custom_closure() {
    let a = DenseMat::from_fn(6, 6, |i, j| (i * j) as f64);
    let mut d = DenseMat::zeros(6, 6);
    map_into(&Expr::leaf(a.view()), &mut d.view_mut(), |x| x.sqrt()).unwrap();
    assert_relative_eq!(d[(4, 4)], 4.0);
    assert_relative_eq!(d[(2, 3)], 6.0f64.sqrt());
}

#[test]
fn test_f32_elements() {
    let a = DenseMat::from_fn(17, 3, |i, j| (i + j) as f32);
    let mut d = DenseMat::zeros(17, 3);
    let p = evaluate_with(
        &(Expr::leaf(a.view()) + Expr::constant(1.0f32, 17, 3)),
        &mut d.view_mut(),
        &EvalConfig::default().with_simd(SimdKind::Avx),
    )
    .unwrap();
    assert_eq!(p, Policy::linear_vector(8));
    assert_eq!(d[(16, 2)], 19.0);
    assert_eq!(maximum(&Expr::leaf(d.view())).unwrap(), 19.0);
}

// ----------------------------------------------------------------------------
// Reference scenarios
// ----------------------------------------------------------------------------

#[test]
fn scenario_max_of_single_element() {
    let data = [3.7];
    let e = Expr::leaf(MatView::dense(&data, 1, 1).unwrap());
    assert_eq!(fold(&Max, f64::NEG_INFINITY, &e).unwrap(), 3.7);
}

#[test]
fn scenario_repeat_row_into_four_rows() {
    let row_data = [1.0, 2.0, 3.0];
    let row = MatView::dense(&row_data, 1, 3).unwrap();
    let mut d = DenseMat::zeros(4, 3);
    evaluate(&Expr::repeat_row(row, 4), &mut d.view_mut()).unwrap();
    for i in 0..4 {
        assert_eq!(d.row(i).to_vec(), vec![1.0, 2.0, 3.0]);
    }
}

#[test]
fn scenario_sum_of_column() {
    let data = [1.0, 2.0, 3.0, 4.0, 5.0];
    let e = Expr::leaf(MatView::dense(&data, 5, 1).unwrap());
    assert_eq!(sum(&e).unwrap(), 15.0);
    assert_eq!(fold(&Sum, 0.0, &e).unwrap(), 15.0);
}

#[test]
fn scenario_copy_from_grid() {
    let data: Vec<f64> = (0..60).map(|x| x as f64 * 0.5).collect();
    let g = MatView::grid(&data, 3, 3, 2, 20).unwrap();
    let mut d = DenseMat::zeros(3, 3);
    let p = evaluate_with(&Expr::leaf(g), &mut d.view_mut(), &EvalConfig::default()).unwrap();
    assert_eq!(p.strategy(), Strategy::PerColScalar);
    for j in 0..3 {
        for i in 0..3 {
            assert_eq!(d[(i, j)], data[2 * i + 20 * j]);
        }
    }
}
