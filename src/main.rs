use openperf_packetio::config::Config;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    let config = Config::default();
    simple_logger::init_with_level(config.log.level)?;
    openperf_packetio::startup(config)
}
