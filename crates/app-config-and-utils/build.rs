fn main() {
    // Defaults in config.rs are baked in with option_env!(), so a changed
    // value must force a rebuild.
    for var in ["SUPABASE_URL", "SUPABASE_PUBLISHABLE_KEY", "LASTBITE_API_URL"] {
        println!("cargo:rerun-if-env-changed={var}");
    }
}
