//! Load a CLAP plugin, list its parameters and presets, and render a sine through it

use clave_plugin::{HostConfig, MidiDisposition, PluginHost};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let Some(plugin_path) = std::env::args().nth(1) else {
        eprintln!("Usage: clap_host <plugin.clap>");
        std::process::exit(2);
    };

    let config = HostConfig::default().sample_rate(48000.0).block_size(1, 512);
    let mut host = PluginHost::with_config(config)?;
    host.load(&plugin_path)?;

    if let Some(metadata) = host.metadata() {
        println!(
            "{} by {} ({} in, {} out, instrument: {})",
            metadata.name,
            metadata.vendor,
            metadata.audio_io.inputs,
            metadata.audio_io.outputs,
            metadata.is_instrument
        );
    }

    for index in 0..host.parameter_count() {
        let info = host.parameter_info(index)?;
        println!(
            "  param {:>3} {:<24} [{} .. {}] = {}",
            info.id,
            info.name,
            info.min_value,
            info.max_value,
            host.get_parameter(index)?
        );
    }
    for index in 0..host.preset_count() {
        println!("  preset {index}: {}", host.preset_name(index).unwrap_or("?"));
    }

    if host.is_instrument() {
        let disposition = host.send_midi(&[0x90, 60, 100])?;
        assert_eq!(disposition, MidiDisposition::Forwarded);
    }

    let input: Vec<f32> = (0..48000)
        .map(|n| (n as f32 * 440.0 * std::f32::consts::TAU / 48000.0).sin() * 0.5)
        .collect();
    let mut output = vec![0.0f32; input.len()];
    for (inp, out) in input.chunks(512).zip(output.chunks_mut(512)) {
        host.render(inp, out);
        host.on_main_thread();
    }

    let peak = output.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
    println!("Rendered {} samples, peak {peak:.3}", output.len());

    host.close();
    Ok(())
}
