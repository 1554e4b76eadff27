use dotenvy::dotenv;

/// Variables from `.env` that are baked into the binary as defaults.
const EXPORTED: &[&str] = &["STWATCH_CONFIG"];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    dotenv().ok();

    for key in EXPORTED {
        println!("cargo:rerun-if-env-changed={key}");
        if let Ok(value) = std::env::var(key) {
            println!("cargo:rustc-env={key}={value}");
        }
    }
}
