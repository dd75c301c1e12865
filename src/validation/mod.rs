pub mod refname;
