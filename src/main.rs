fn main() -> std::process::ExitCode {
    serialtap_lib::run()
}
