//! Run both end-to-end scenarios (one module per scenario) and print their
//! outcomes.

mod scenarios;

use scenarios::{for_each_loop, for_loop, nested_routing, parallel_fan_out, router_branch};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Router branch: an unselected path never runs ===\n");
    let outcome = router_branch::run().await?;
    println!(
        "success={} executed={:?}\n",
        outcome.success,
        outcome.context.executed_blocks
    );

    println!("=== For loop: three iterations, interior blocks reset each round ===\n");
    let outcome = for_loop::run().await?;
    println!(
        "success={} completed_loops={:?}\n",
        outcome.success, outcome.context.completed_loops
    );

    println!("=== ForEach loop: one iteration per element, in order ===\n");
    let outcome = for_each_loop::run().await?;
    println!(
        "success={} completed_loops={:?}\n",
        outcome.success, outcome.context.completed_loops
    );

    println!("=== Parallel fan-out: one virtual block per distribution item ===\n");
    let outcome = parallel_fan_out::run().await?;
    println!(
        "success={} completed_loops={:?}\n",
        outcome.success, outcome.context.completed_loops
    );

    println!("=== Nested router -> condition -> parallel: unselected parallel branch never runs ===\n");
    let outcome = nested_routing::run().await?;
    println!(
        "success={} executed={:?}",
        outcome.success, outcome.context.executed_blocks
    );

    Ok(())
}
