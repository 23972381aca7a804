use std::future::Future;

use tempfile::TempDir;

use super::DB;

/// Run `fun` against a database in a fresh temporary directory that is
/// removed afterwards.
pub async fn run_test_db<T, Fut>(fun: T) -> Fut::Output
where
    T: FnOnce(DB) -> Fut,
    Fut: Future,
{
    // Use `/tmp`-equivalent so that any resource leak of the db files will
    // eventually be cleaned up, even if e.g. TempDir's drop handler never runs
    // due to a segfault etc encountered during the test.
    let db_tmp_dir = TempDir::new().unwrap();
    let db = DB::from_path(db_tmp_dir.path()).unwrap();
    fun(db).await
}
