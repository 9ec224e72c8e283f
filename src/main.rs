fn main() -> anyhow::Result<()> {
    bv_cli::run()
}
