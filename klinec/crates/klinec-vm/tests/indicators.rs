//! End-to-end indicator tests: compile a script, round-trip it through the
//! textual bytecode form, execute over registered bar data, and check the
//! plotted output. Scripts use the Hithink frontend unless noted; the
//! convention is one output binding named `RESULT`.

use klinec_gen::{compile_easylang, compile_hithink, compile_pine};
use klinec_vm::Vm;

const EPSILON: f64 = 1e-5;

fn approx(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() < EPSILON
}

fn run_bytecode(text: &str, data: &[(&str, &[f64])]) -> Vm {
    let mut vm = Vm::new();
    let mut total = 0usize;
    for (name, values) in data {
        vm.register_series(name, values.to_vec());
        total = total.max(values.len());
    }
    vm.load_bytecode(text).expect("bytecode load failed");
    vm.execute(total).expect("execution failed");
    vm
}

/// Compile Hithink source, serialize, reload (checksum verified on every
/// test), and execute over `data`.
fn run(script: &str, data: &[(&str, &[f64])]) -> Vm {
    let bytecode = compile_hithink(script).expect("compilation failed");
    run_bytecode(&bytecode.to_text(), data)
}

fn plotted(vm: &Vm, name: &str) -> Vec<f64> {
    vm.plotted()
        .iter()
        .find(|p| p.series.borrow().name() == name)
        .unwrap_or_else(|| panic!("no plotted series named '{}'", name))
        .series
        .borrow()
        .data()
        .to_vec()
}

fn check_at(script: &str, data: &[(&str, &[f64])], bar: usize, expected: f64) {
    let vm = run(script, data);
    let result = plotted(&vm, "RESULT");
    let actual = result.get(bar).copied().unwrap_or(f64::NAN);
    assert!(
        approx(actual, expected),
        "{script:?} at bar {bar}: expected {expected}, got {actual}"
    );
}

fn check_series(script: &str, data: &[(&str, &[f64])], expected: &[f64]) {
    let vm = run(script, data);
    let actual = plotted(&vm, "RESULT");
    assert_eq!(actual.len(), expected.len(), "series length for {script:?}");
    for (bar, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            approx(*a, *e),
            "{script:?} at bar {bar}: expected {e}, got {a}"
        );
    }
}

// --- End-to-end scenarios ---------------------------------------------------

#[test]
fn sma3_on_close() {
    check_series(
        "RESULT: ma(close, 3);",
        &[("close", &[2.0, 4.0, 6.0, 8.0])],
        &[f64::NAN, f64::NAN, 4.0, 6.0],
    );
}

#[test]
fn ref_lookback() {
    check_series(
        "RESULT: ref(close, 2);",
        &[("close", &[10.0, 20.0, 30.0, 40.0])],
        &[f64::NAN, f64::NAN, 10.0, 20.0],
    );
}

#[test]
fn conditional_count() {
    check_at(
        "cond := close > 12; RESULT: count(cond, 5);",
        &[("close", &[9.0, 11.0, 13.0, 14.0, 8.0])],
        4,
        2.0,
    );
}

#[test]
fn drawtext_gates_the_plot() {
    let vm = run(
        "v := close > open; drawtext(v, low, 'UP');",
        &[
            ("close", &[10.0, 12.0]),
            ("open", &[11.0, 10.0]),
            ("low", &[9.0, 8.0]),
        ],
    );
    assert_eq!(vm.plotted().len(), 1);
    let up = plotted(&vm, "UP");
    assert_eq!(up.len(), 2);
    assert!(up[0].is_nan());
    assert!(approx(up[1], 8.0));
}

#[test]
fn output_binding_registers_plot_and_csv_header() {
    let bytecode = compile_hithink("MA5: ma(close, 2);").expect("compilation failed");
    let mut vm = Vm::new();
    vm.register_series("time", vec![20240101.0, 20240102.0, 20240103.0, 20240104.0]);
    vm.register_series("close", vec![1.0, 2.0, 3.0, 4.0]);
    vm.load_bytecode(&bytecode.to_text()).unwrap();
    vm.execute(4).unwrap();

    assert_eq!(vm.plotted().len(), 1);
    assert_eq!(vm.plotted()[0].series.borrow().name(), "MA5");

    let csv = vm.plotted_results_as_csv(3);
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("time,MA5"));
    assert_eq!(lines.next(), Some("20240101,"));
    assert_eq!(lines.next(), Some("20240102,1.500"));
}

#[test]
fn tampered_bytecode_is_rejected_and_state_kept() {
    let bytecode = compile_hithink("RESULT: ma(close, 3);").expect("compilation failed");
    let text = bytecode.to_text();

    let mut vm = Vm::new();
    vm.register_series("close", vec![2.0, 4.0, 6.0, 8.0]);
    vm.load_bytecode(&text).unwrap();
    vm.execute(4).unwrap();

    // Bump the operand of the store instruction by one.
    let needle = "3: STORE_AND_PLOT_GLOBAL 0";
    assert!(text.contains(needle), "unexpected listing shape");
    let tampered = text.replace(needle, "3: STORE_AND_PLOT_GLOBAL 1");
    assert_ne!(tampered, text);

    let err = vm.load_bytecode(&tampered);
    assert!(err.is_err());
    // The previous program keeps running.
    assert_eq!(vm.bar_index(), 4);
    assert!(approx(plotted(&vm, "RESULT")[3], 6.0));
}

// --- Quantified invariants --------------------------------------------------

#[test]
fn ema_satisfies_its_recurrence() {
    let data = [10.0, 11.0, 12.0, 13.0, 12.5, 14.0];
    let vm = run("RESULT: ema(close, 3);", &[("close", &data)]);
    let ema = plotted(&vm, "RESULT");

    assert!(approx(ema[0], data[0]));
    for b in 1..data.len() {
        let expected = (2.0 * data[b] + 2.0 * ema[b - 1]) / 4.0;
        assert!(approx(ema[b], expected), "recurrence broken at bar {b}");
    }
}

#[test]
fn hhv_is_the_window_max() {
    let data = [8.0, 12.0, 9.0, 11.0, 7.0, 13.0];
    let vm = run("RESULT: hhv(high, 3);", &[("high", &data)]);
    let hhv = plotted(&vm, "RESULT");
    for b in 0..data.len() {
        let lo = b.saturating_sub(2);
        let expected = data[lo..=b].iter().cloned().fold(f64::MIN, f64::max);
        assert!(approx(hhv[b], expected), "window max broken at bar {b}");
    }
}

#[test]
fn executing_twice_with_the_same_total_changes_nothing() {
    let mut vm = Vm::new();
    vm.register_series("close", vec![2.0, 4.0, 6.0, 8.0]);
    let bytecode = compile_hithink("RESULT: ma(close, 3);").unwrap();
    vm.load_bytecode(&bytecode.to_text()).unwrap();
    vm.execute(4).unwrap();
    let first = plotted(&vm, "RESULT");
    vm.execute(4).unwrap();
    assert_eq!(plotted(&vm, "RESULT"), first);
}

#[test]
fn incremental_execution_matches_a_single_run() {
    let script = "cond := close > 10; RESULT: ema(close, 3) + count(cond, 3);";
    let full: Vec<f64> = vec![9.0, 11.0, 12.0, 10.0, 13.0, 14.0, 8.0];

    let reference = run(script, &[("close", &full)]);
    let expected = plotted(&reference, "RESULT");

    let bytecode = compile_hithink(script).unwrap();
    let mut vm = Vm::new();
    vm.register_series("close", full[..4].to_vec());
    vm.load_bytecode(&bytecode.to_text()).unwrap();
    vm.execute(4).unwrap();

    let close = vm.get_series("close").unwrap();
    for v in &full[4..] {
        close.borrow_mut().push(*v);
    }
    vm.execute(full.len()).unwrap();

    let actual = plotted(&vm, "RESULT");
    assert_eq!(actual.len(), expected.len());
    for (bar, (a, e)) in actual.iter().zip(&expected).enumerate() {
        assert!(approx(*a, *e), "bar {bar}: expected {e}, got {a}");
    }
}

#[test]
fn compile_load_round_trip_preserves_the_checksum() {
    let bytecode = compile_hithink("x := ma(close, 5); RESULT: x - ref(x, 1);").unwrap();
    let text = bytecode.to_text();
    let reloaded = klinec_ir::Bytecode::from_text(&text).unwrap();
    assert_eq!(reloaded.checksum(), bytecode.checksum());
    assert_eq!(reloaded.to_text(), text);
}

// --- Reference functions ----------------------------------------------------

#[test]
fn ama_and_dma_smooth_recursively() {
    let closes: &[f64] = &[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 16.0, 15.0];
    check_at("RESULT: ama(close, 0.1);", &[("close", closes)], 9, 12.90678);
    check_at("RESULT: dma(close, 0.1);", &[("close", closes)], 9, 12.90678);
}

#[test]
fn barscount_counts_valid_bars() {
    check_at(
        "RESULT: barscount(1);",
        &[("close", &[1.0, 2.0, 3.0, 4.0, 5.0])],
        4,
        5.0,
    );
}

#[test]
fn barslast_and_barssince_report_offsets() {
    check_at(
        "cond := C > 10; RESULT: barslast(cond);",
        &[("close", &[9.0, 11.0, 9.0, 9.0])],
        3,
        2.0,
    );
    check_at(
        "cond := C > 12; RESULT: barssince(cond);",
        &[("close", &[10.0, 11.0, 13.0, 11.0, 12.0])],
        4,
        2.0,
    );
    // Never true: barslast is NaN, barssince is -1.
    check_at(
        "cond := C > 99; RESULT: barslast(cond);",
        &[("close", &[1.0, 2.0])],
        1,
        f64::NAN,
    );
    check_at(
        "cond := C > 99; RESULT: barssince(cond);",
        &[("close", &[1.0, 2.0])],
        1,
        -1.0,
    );
}

#[test]
fn barssincen_finds_the_nth_signal() {
    check_at(
        "cond := C > 10; RESULT: barssincen(cond, 2);",
        &[("close", &[9.0, 11.0, 9.0, 12.0, 13.0])],
        4,
        1.0,
    );
}

#[test]
fn barslastcount_measures_the_run() {
    check_at(
        "cond := C > 10; RESULT: barslastcount(cond);",
        &[("close", &[9.0, 11.0, 12.0, 10.0, 13.0, 14.0])],
        5,
        2.0,
    );
}

#[test]
fn window_extremes() {
    let high: &[f64] = &[8.0, 12.0, 9.0, 11.0];
    let low: &[f64] = &[8.0, 12.0, 5.0, 11.0];
    check_at("RESULT: hhv(high, 3);", &[("high", high)], 3, 12.0);
    check_at("RESULT: hhvbars(high, 3);", &[("high", high)], 3, 2.0);
    check_at("RESULT: hod(high, 2);", &[("high", high)], 3, 12.0);
    check_at("RESULT: llv(low, 4);", &[("low", low)], 3, 5.0);
    check_at("RESULT: llvbars(low, 4);", &[("low", low)], 3, 1.0);
    check_at("RESULT: lod(low, 1);", &[("low", low)], 3, 5.0);
}

#[test]
fn hv_and_lv_exclude_the_current_bar() {
    let high: &[f64] = &[8.0, 12.0, 9.0, 20.0];
    check_at("RESULT: hv(high, 3);", &[("high", high)], 3, 12.0);
    let low: &[f64] = &[9.0, 3.0, 7.0, 1.0];
    check_at("RESULT: lv(low, 3);", &[("low", low)], 3, 3.0);
}

#[test]
fn findhigh_ranks_a_shifted_window() {
    let high: &[f64] = &[8.0, 12.0, 9.0, 11.0, 7.0, 6.0];
    // Window of 3 bars ending 2 bars ago: bars 1..=3 → [12, 9, 11].
    check_at(
        "RESULT: findhigh(high, 2, 3, 1);",
        &[("high", high)],
        5,
        12.0,
    );
    check_at(
        "RESULT: findhighbars(high, 2, 3, 1);",
        &[("high", high)],
        5,
        4.0,
    );
    check_at("RESULT: findlow(high, 2, 3, 1);", &[("high", high)], 5, 9.0);
    check_at(
        "RESULT: findlowbars(high, 2, 3, 1);",
        &[("high", high)],
        5,
        3.0,
    );
}

#[test]
fn simple_sums_and_products() {
    let closes: &[f64] = &[2.0, 4.0, 6.0, 8.0];
    check_at("RESULT: sum(close, 3);", &[("close", closes)], 3, 18.0);
    check_at("RESULT: ma(close, 3);", &[("close", closes)], 3, 6.0);
    check_at("RESULT: sma(close, 3, 1);", &[("close", closes)], 3, 6.0);
    check_at("RESULT: mular(close, 3);", &[("close", closes)], 3, 192.0);
    check_at("RESULT: wma(close, 3);", &[("close", &[1.0, 2.0, 3.0, 4.0])], 3, 3.3333333);
}

#[test]
fn subscript_reads_history() {
    check_series(
        "RESULT: C[1];",
        &[("close", &[10.0, 20.0, 30.0])],
        &[f64::NAN, 10.0, 20.0],
    );
}

#[test]
fn totalbars_and_islastbar() {
    let closes: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    check_at("RESULT: totalbarscount();", &[("close", closes)], 6, 7.0);
    check_at("RESULT: islastbar();", &[("close", &[1.0, 2.0, 3.0, 4.0, 5.0])], 4, 1.0);
    check_at("RESULT: islastbar();", &[("close", &[1.0, 2.0, 3.0, 4.0, 5.0])], 3, 0.0);
}

#[test]
fn stubbed_shape_functions_return_nan() {
    check_at("RESULT: sar(4, 2, 2);", &[("close", &[1.0, 2.0, 3.0])], 2, f64::NAN);
    check_at("RESULT: cost();", &[("close", &[10.0, 11.0, 12.0])], 2, 12.0);
}

// --- Math -------------------------------------------------------------------

#[test]
fn math_functions() {
    let one: &[(&str, &[f64])] = &[("close", &[1.0])];
    check_at("RESULT: abs(-12.5);", one, 0, 12.5);
    check_at("RESULT: acos(0.5);", one, 0, 1.047197551);
    check_at("RESULT: asin(0.5);", one, 0, 0.523598775);
    check_at("RESULT: atan(1);", one, 0, 0.785398163);
    check_at("RESULT: ceil(3.14);", one, 0, 4.0);
    check_at("RESULT: cos(0);", one, 0, 1.0);
    check_at("RESULT: exp(1);", one, 0, 2.718281828);
    check_at("RESULT: floor(3.99);", one, 0, 3.0);
    check_at("RESULT: intpart(3.99);", one, 0, 3.0);
    check_at("RESULT: ln(10);", one, 0, 2.302585093);
    check_at("RESULT: log(100);", one, 0, 2.0);
    check_at("RESULT: mod(10, 3);", one, 0, 1.0);
    check_at("RESULT: pow(2, 10);", one, 0, 1024.0);
    check_at("RESULT: round(3.5);", one, 0, 4.0);
    check_at("RESULT: round(3.456, 2);", one, 0, 3.46);
    check_at("RESULT: sign(-100);", one, 0, -1.0);
    check_at("RESULT: sin(0);", one, 0, 0.0);
    check_at("RESULT: sqrt(16);", one, 0, 4.0);
    check_at("RESULT: tan(0);", one, 0, 0.0);
}

#[test]
fn between_checks_the_band() {
    check_at(
        "RESULT: between(C, L, H);",
        &[("close", &[10.0]), ("low", &[9.0]), ("high", &[11.0])],
        0,
        1.0,
    );
    check_at(
        "RESULT: between(C, L, H);",
        &[("close", &[12.0]), ("low", &[9.0]), ("high", &[11.0])],
        0,
        0.0,
    );
}

// --- Selection and logic ----------------------------------------------------

#[test]
fn scalar_select() {
    check_at(
        "RESULT: if(C > O, 1, 0);",
        &[("close", &[11.0]), ("open", &[10.0])],
        0,
        1.0,
    );
    check_at(
        "RESULT: if(C > O, 1, 0);",
        &[("close", &[9.0]), ("open", &[10.0])],
        0,
        0.0,
    );
}

#[test]
fn valuewhen_latches() {
    check_series(
        "cond := C > 15; RESULT: valuewhen(cond, O);",
        &[
            ("close", &[10.0, 12.0, 16.0, 14.0]),
            ("open", &[9.0, 11.0, 15.0, 13.0]),
        ],
        &[f64::NAN, f64::NAN, 15.0, 15.0],
    );
}

#[test]
fn cross_matches_its_definition() {
    let cases: &[(&[f64], &[f64], f64)] = &[
        // Upward cross.
        (&[9.0, 11.0], &[10.0, 10.0], 1.0),
        // No cross.
        (&[9.0, 9.0], &[10.0, 10.0], 0.0),
        // Downward cross also counts.
        (&[11.0, 9.0], &[10.0, 10.0], 1.0),
    ];
    for &(close, open, expected) in cases {
        let vm = run(
            "RESULT: cross(C, O);",
            &[("close", close), ("open", open)],
        );
        let result = plotted(&vm, "RESULT");
        assert!(approx(result[1], expected));
    }
}

#[test]
fn longcross_only_fires_upward() {
    check_at(
        "RESULT: longcross(C, O);",
        &[("close", &[9.0, 11.0]), ("open", &[10.0, 10.0])],
        1,
        1.0,
    );
    check_at(
        "RESULT: longcross(C, O);",
        &[("close", &[11.0, 9.0]), ("open", &[10.0, 10.0])],
        1,
        0.0,
    );
}

#[test]
fn every_and_exist_windows() {
    check_at(
        "cond := C > 10; RESULT: every(cond, 3);",
        &[("close", &[9.0, 12.0, 11.0, 13.0])],
        3,
        1.0,
    );
    check_at(
        "cond := C > 12; RESULT: exist(cond, 4);",
        &[("close", &[9.0, 11.0, 10.0, 13.0])],
        3,
        1.0,
    );
}

#[test]
fn filter_suppresses_repeat_signals() {
    check_series(
        "cond := C > 10; RESULT: filter(cond, 3);",
        &[("close", &[9.0, 8.0, 11.0, 12.0, 9.0])],
        &[0.0, 0.0, 1.0, 0.0, 0.0],
    );
}

#[test]
fn not_inverts_truthiness() {
    check_at("RESULT: not(C > 10);", &[("close", &[9.0])], 0, 1.0);
}

#[test]
fn logical_operators_combine_conditions() {
    check_series(
        "RESULT: C > 10 AND C < 14;",
        &[("close", &[9.0, 12.0, 15.0])],
        &[0.0, 1.0, 0.0],
    );
    check_series(
        "RESULT: C < 10 OR C > 14;",
        &[("close", &[9.0, 12.0, 15.0])],
        &[1.0, 0.0, 1.0],
    );
}

#[test]
fn input_int_returns_its_default() {
    check_at("RESULT: input.int(42, 'title');", &[("close", &[1.0])], 0, 42.0);
}

// --- Statistics -------------------------------------------------------------

#[test]
fn deviation_statistics() {
    check_at(
        "RESULT: avedev(close, 4);",
        &[("close", &[2.0, 4.0, 4.0, 4.0, 5.0, 8.0, 8.0, 8.0])],
        7,
        1.125,
    );
    let closes: &[f64] = &[10.0, 12.0, 11.0, 13.0];
    check_at("RESULT: std(close, 4);", &[("close", closes)], 3, 1.290994449);
    check_at("RESULT: stddev(close, 4);", &[("close", closes)], 3, 1.290994449);
    check_at("RESULT: stdp(close, 4);", &[("close", closes)], 3, 1.118033989);
    check_at("RESULT: var(close, 4);", &[("close", closes)], 3, 1.6666667);
    check_at("RESULT: varp(close, 4);", &[("close", closes)], 3, 1.25);
    check_at("RESULT: devsq(close, 4);", &[("close", closes)], 3, 5.0);
}

#[test]
fn covariance_and_slope() {
    check_at(
        "RESULT: covar(C, O, 4);",
        &[("close", &[2.0, 3.0, 5.0, 6.0]), ("open", &[3.0, 4.0, 4.0, 7.0])],
        3,
        2.666666,
    );
    check_at(
        "RESULT: slope(close, 4);",
        &[("close", &[10.0, 11.0, 12.0, 13.0])],
        3,
        1.0,
    );
}

// --- Other frontends --------------------------------------------------------

#[test]
fn pine_pipeline_plots_a_moving_average() {
    let bytecode =
        compile_pine("ma = ta.sma(close, 2)\nplot(ma, color.red)").expect("compilation failed");
    let vm = run_bytecode(&bytecode.to_text(), &[("close", &[2.0, 4.0, 6.0])]);
    assert_eq!(vm.plotted().len(), 1);
    assert_eq!(vm.plotted()[0].color, "color.red");
    let series = plotted(&vm, "plot");
    assert!(approx(series[0], 2.0));
    assert!(approx(series[1], 3.0));
    assert!(approx(series[2], 5.0));
}

#[test]
fn easylanguage_pipeline_with_declarations_and_branches() {
    let source = "Inputs: Length(2);\n\
                  Variables: M(0);\n\
                  M = Average(Close, Length);\n\
                  If M > 3 Then Begin M = 99; End;\n\
                  Plot1(M);";
    let bytecode = compile_easylang(source).expect("compilation failed");
    let vm = run_bytecode(&bytecode.to_text(), &[("close", &[2.0, 4.0, 6.0])]);
    let series = plotted(&vm, "Plot1");
    // Averages: 2, 3, 5; the branch rewrites the last bar.
    assert!(approx(series[0], 2.0));
    assert!(approx(series[1], 3.0));
    assert!(approx(series[2], 99.0));
}

#[test]
fn expmema_waits_for_its_window() {
    check_series(
        "RESULT: expmema(close, 3);",
        &[("close", &[10.0, 11.0, 12.0, 13.0])],
        &[f64::NAN, f64::NAN, 11.0, 12.0],
    );
}

#[test]
fn runtime_error_reports_bar_and_instruction() {
    let bytecode = compile_hithink("RESULT: ma(close, 3);").unwrap();
    let mut vm = Vm::new();
    // No close series registered: LOAD_BUILTIN_VAR fails on the first bar.
    vm.load_bytecode(&bytecode.to_text()).unwrap();
    let err = vm.execute(2).unwrap_err();
    assert_eq!(err.bar, 0);
    assert!(err.to_string().contains("close"));
    assert!(vm.last_error_message().is_some());
}
