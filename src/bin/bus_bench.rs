use picopc::Machine;
use std::time::Instant;

fn main() {
    env_logger::init();

    let mut machine = match Machine::new(16 * 1024 * 1024) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Failed to build machine: {}", e);
            std::process::exit(1);
        }
    };

    let start = Instant::now();
    let iterations = 100_000_000u64;

    // Accumulate so the reads are not optimised away
    let mut accumulator: u64 = 0;

    for i in 0..iterations {
        // Conventional and extended RAM, skipping the VGA hole
        let addr = match (i as u32) % 0x200000 {
            a if a < 0xA0000 => a,
            a => a | 0x100000,
        };
        let val = machine.read_byte(addr);
        accumulator = accumulator.wrapping_add(val as u64);
    }

    let duration = start.elapsed();
    println!("Memory Read Byte Benchmark");
    println!("Iterations: {}", iterations);
    println!("Time: {:?}", duration);
    println!(
        "M Ops/sec: {:.2}",
        (iterations as f64 / duration.as_secs_f64()) / 1_000_000.0
    );
    println!("Accumulator: {}", accumulator);

    let start = Instant::now();
    let port_iterations = 10_000_000u64;
    for _ in 0..port_iterations {
        machine.add_cpu_cycles(10);
        accumulator = accumulator.wrapping_add(machine.read_port(0x3DA) as u64);
    }
    let duration = start.elapsed();
    println!("Port Read Benchmark (0x3DA)");
    println!("Iterations: {}", port_iterations);
    println!("Time: {:?}", duration);
    println!(
        "M Ops/sec: {:.2}",
        (port_iterations as f64 / duration.as_secs_f64()) / 1_000_000.0
    );
    println!("Accumulator: {}", accumulator);
}
