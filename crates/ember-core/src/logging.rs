pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter("debug,notify=info,async_io=info")
        .init();
}
