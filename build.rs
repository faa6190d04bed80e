fn main() {
    // Only the ESP-IDF firmware build needs the sysenv link arguments; host
    // builds and tests compile the library without the IDF toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
