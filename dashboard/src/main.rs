mod ai;
mod config;
mod error;
mod host;
mod http;
mod sensor_api;
mod service;
mod session;
mod sheets;
#[cfg(test)]
mod test_support;
mod weather;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
