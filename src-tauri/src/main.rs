// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("fatal panic: {info}");
        pyyomi_desktop_lib::cleanup_on_panic();
        std::process::exit(1);
    }));

    pyyomi_desktop_lib::run();
}
