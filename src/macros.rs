macro_rules! scpidbg {
    ($line:expr) => {
        log::trace!("SCPI: {}", $line);
        #[cfg(feature="debug_commands")]
        eprintln!("SCPI: {}", $line);
    };
}
