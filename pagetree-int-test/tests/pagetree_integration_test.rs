mod mtree;
mod persistence;
mod rtree;

#[ctor::ctor]
fn init() {
    colog::init();
}
