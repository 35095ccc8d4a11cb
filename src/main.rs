fn main() {
    exam_proctor_lib::run()
}
