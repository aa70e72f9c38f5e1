// Standalone fitting binary - no cargo overhead
use ndarray::{Array1, Array2};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Instant;

use mars_rust::{Mars, MarsConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <data_file> [m_max]", args[0]);
        eprintln!("  data_file: header 'n d', n rows of covariates, n rows of responses");
        std::process::exit(1);
    }

    let filename = &args[1];
    let max_basis: usize = match args.get(2) {
        Some(arg) => arg.parse()?,
        None => MarsConfig::default().max_basis,
    };

    // Read data
    let file = File::open(filename)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines.next().ok_or("empty data file")??;
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err("header must contain 'n d'".into());
    }
    let n: usize = parts[0].parse()?;
    let d: usize = parts[1].parse()?;

    eprintln!("Data: n={}, d={}", n, d);
    eprintln!("m_max: {}", max_basis);

    let mut x_vec = Vec::with_capacity(n * d);
    for _ in 0..n {
        let line = lines.next().ok_or("missing covariate row")??;
        for val in line.split_whitespace() {
            x_vec.push(val.parse::<f64>()?);
        }
    }
    let x = Array2::from_shape_vec((n, d), x_vec)?;

    let mut y_vec = Vec::with_capacity(n);
    for _ in 0..n {
        let line = lines.next().ok_or("missing response row")??;
        y_vec.push(line.trim().parse::<f64>()?);
    }
    let y = Array1::from_vec(y_vec);

    let mut mars = Mars::new(MarsConfig::default().with_max_basis(max_basis));

    // TIMED SECTION - forward and backward pass
    let start = Instant::now();
    mars.fit(&x, &y)?;
    let elapsed = start.elapsed();

    eprintln!("\nFit time: {:.1} ms", elapsed.as_secs_f64() * 1000.0);
    eprintln!(
        "Forward rounds: {}, pruning steps: {}",
        mars.forward_rounds.len(),
        mars.pruning_steps.len()
    );

    let basis = mars.basis().ok_or("model was not fitted")?;
    let coefficients = mars.coefficients().ok_or("model was not fitted")?;

    // Output results
    println!("COEFFICIENTS");
    for coef in coefficients.iter() {
        println!("{}", coef);
    }
    println!("END_COEFFICIENTS");

    println!("KNOTS");
    for knot in basis.iter().flat_map(|b| b.terms().iter().map(|t| t.knot)) {
        println!("{}", knot);
    }
    println!("END_KNOTS");

    println!("LOF");
    println!("{}", mars.lof().unwrap_or(f64::INFINITY));
    println!("END_LOF");

    Ok(())
}
