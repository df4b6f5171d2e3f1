fn main() {
    meterdesk_lib::run()
}
