//! The workflow used when a repository doesn't provide its own

/// Minimum supported toolchain checked by the `msrv` job
pub const MINIMUM_TOOLCHAIN: &str = "1.70.0";

pub const BUILTIN_WORKFLOW: &str = r#"
name: CI

on: [push, pull_request]

env:
  RUSTFLAGS: -Dwarnings
  RUSTDOCFLAGS: -Dwarnings

jobs:
  tests:
    name: Tests
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: dtolnay/rust-toolchain@stable
      - uses: Swatinem/rust-cache@v2
      - name: Build
        run: cargo build --workspace
      - name: Test
        run: cargo test --workspace --no-fail-fast

  checks:
    name: Checks
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: dtolnay/rust-toolchain@stable
        with:
          components: clippy, rustfmt
      - uses: Swatinem/rust-cache@v2
      - name: Clippy
        run: cargo clippy --workspace --all-targets --all-features
      - name: Format
        run: cargo fmt --all -- --check
      - name: Docs
        run: cargo doc --workspace --no-deps

  msrv:
    name: Minimum rustc version
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v4
      - uses: dtolnay/rust-toolchain@1.70.0
      - uses: Swatinem/rust-cache@v2
      - name: Check
        run: cargo check --workspace
"#;
