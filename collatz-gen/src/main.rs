extern crate argparse;
extern crate serde_json;

extern crate collatz;

use std::io::{self, BufWriter, Write};
use std::process;

use argparse::{ArgumentParser, Store, StoreTrue};
use tracing::{error, info};

use collatz::curve::{curves_for_batch, CurveRecord, Turns};
use collatz::sequence::{sequence_array, DEFAULT_MAX_STEPS};

struct GenConf {
    count: usize,
    turns: Turns,
    frames: usize,
    left_max: f64,
    right_max: f64,
    max_steps: usize,
}

fn main() {
    let defaults = Turns::default();
    let mut count: usize = 5000;
    let mut left = defaults.left;
    let mut right = defaults.right;
    let mut scale = defaults.scale;
    let mut frames: usize = 0;
    let mut left_max = 0.2;
    let mut right_max = 0.3;
    let mut max_steps = DEFAULT_MAX_STEPS;
    let mut verbose = false;
    {
        let mut argparse = ArgumentParser::new();
        argparse.set_description(
            "Bend the Collatz trajectories of 1..N into curves and print them as JSON lines.",
        );
        argparse.refer(&mut count).add_option(
            &["-n", "--count"],
            Store,
            "Number of starting values, 1..N (default 5000)",
        );
        argparse.refer(&mut left).add_option(
            &["-a", "--left"],
            Store,
            "Counter-clockwise turn in radians after an even value (default 0.3)",
        );
        argparse.refer(&mut right).add_option(
            &["-b", "--right"],
            Store,
            "Clockwise turn in radians after an odd value (default 0.265)",
        );
        argparse.refer(&mut scale).add_option(
            &["-s", "--scale"],
            Store,
            "Length of every step after the first (default 1.2)",
        );
        argparse.refer(&mut frames).add_option(
            &["--frames"],
            Store,
            "Emit an animation sweeping the turns from 0 up to --left-max/--right-max over this \
             many frames instead of a single frame (default off)",
        );
        argparse.refer(&mut left_max).add_option(
            &["--left-max"],
            Store,
            "Final left turn of an animation (default 0.2)",
        );
        argparse.refer(&mut right_max).add_option(
            &["--right-max"],
            Store,
            "Final right turn of an animation (default 0.3)",
        );
        argparse.refer(&mut max_steps).add_option(
            &["--max-steps"],
            Store,
            "Give up if the batch has not settled after this many steps (default 10000)",
        );
        argparse.refer(&mut verbose).add_option(
            &["-v", "--verbose"],
            StoreTrue,
            "Log debug output to stderr",
        );
        argparse.parse_args_or_exit();
    }
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let conf = GenConf {
        count,
        turns: Turns {
            left,
            right,
            scale,
        },
        frames,
        left_max,
        right_max,
        max_steps,
    };
    if let Err(e) = generate(&conf) {
        error!("{}", e);
        process::exit(1);
    }
}

fn generate(conf: &GenConf) -> collatz::Result<()> {
    let schedule = if conf.frames == 0 {
        conf.turns.validate()?;
        vec![conf.turns]
    } else {
        Turns::sweep(conf.frames, conf.left_max, conf.right_max, conf.turns.scale)?
    };
    info!(
        "Computing {} trajectories for {} frame(s), starting from {}",
        conf.count,
        schedule.len(),
        schedule[0]
    );

    let batch = sequence_array(conf.count, conf.max_steps)?;
    info!("Batch settled after {} steps", batch.height() - 1);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (frame, turns) in schedule.iter().enumerate() {
        let curves = curves_for_batch(&batch, turns)?;
        for curve in curves {
            let record = CurveRecord {
                frame: frame as u32,
                left: turns.left,
                right: turns.right,
                curve,
            };
            serde_json::to_writer(&mut out, &record)?;
            writeln!(out)?;
        }
        info!("Frame {} written: {}", frame, turns);
    }
    out.flush()?;
    Ok(())
}
