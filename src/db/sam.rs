pub mod lib_sam;
pub mod monthly_extract_archive;
