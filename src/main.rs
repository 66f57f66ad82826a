//! sendplz utility - main entrypoint
// (c) 2024 sendplz contributors

fn main() -> anyhow::Result<std::process::ExitCode> {
    sendplz::cli()
}
