use std::io::Write;

/// Write the argument as a single character to stderr.
pub extern "C" fn putchard(x: f64) -> f64 {
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(&[x as u8]);
    let _ = stderr.flush();
    0.0
}

/// Print the argument on its own line to stderr.
pub extern "C" fn printd(x: f64) -> f64 {
    eprintln!("{}", x);
    0.0
}

/// Host functions made callable from jitted code, by symbol name.
pub fn builtins() -> [(&'static str, usize); 2] {
    [
        ("putchard", putchard as extern "C" fn(f64) -> f64 as usize),
        ("printd", printd as extern "C" fn(f64) -> f64 as usize),
    ]
}
