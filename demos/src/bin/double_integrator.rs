//! Receding-horizon control of a double integrator.
//!
//! Solves a 1-second horizon at 10 Hz, applies the first input to the
//! simulated plant, shifts the horizon and re-solves with a warm start.
//!
//! Run: `cargo run -p gallop-demos --bin double_integrator`

use gallop_core::prelude::*;
use gallop_demos::simulate_plant;
use gallop_sqp::{Settings, SqpSolver};
use nalgebra::{DMatrix, dvector};

fn main() {
    println!("=== Double integrator MPC ===\n");

    let mut plant = LtiDynamics::double_integrator();
    let cost = QuadraticCost::new(DMatrix::identity(2, 2), DMatrix::identity(1, 1) * 0.1);
    let terminal = QuadraticTerminalCost::new(DMatrix::identity(2, 2) * 50.0);
    let operating = StaticOperatingPoint::zeros(2, 1);

    let settings = Settings {
        n_threads: 4,
        dt: 0.1,
        sqp_iteration: 5,
        use_feedback_policy: true,
        print_solver_statistics: false,
        ..Settings::default()
    };
    let mut solver = SqpSolver::new(settings, &plant, &cost, &operating)
        .with_terminal_cost(&terminal);

    let control_period = 0.1;
    let horizon = 1.0;
    let steps = 30;

    let mut t = 0.0;
    let mut x = dvector![1.0, 0.0];

    println!("step   t      x1       x2       u        iters");
    for step in 0..steps {
        solver
            .run(t, &x, t + horizon)
            .expect("MPC solve failed");

        let u = solver.primal_solution().controller.compute_input(t, &x);
        let iterations = solver
            .iterations_log()
            .map(|log| log.len())
            .unwrap_or(0);

        if step % 5 == 0 {
            println!(
                "{step:4}  {t:5.2}  {:+.4}  {:+.4}  {:+.4}  {iterations:5}",
                x[0], x[1], u[0],
            );
        }

        x = simulate_plant(&mut plant, t, &x, &u, control_period, 4);
        t += control_period;
    }

    println!("\n=== Summary ===");
    println!("final state: [{:+.5}, {:+.5}]", x[0], x[1]);
    println!("final norm : {:.5}", x.norm());
    println!("\n{}", solver.benchmark_summary());
}
