//! Camera capture demo.

fn main() -> anyhow::Result<()> {
    camcapture_demo_lib::run()
}
