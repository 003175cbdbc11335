//! Body-size bucketing for metric labels.

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Bucket a byte count into its canonical size-class label.
pub fn size_class(bytes: u64) -> &'static str {
    if bytes < KB {
        "tiny"
    } else if bytes < 100 * KB {
        "small"
    } else if bytes < MB {
        "medium"
    } else if bytes < 100 * MB {
        "large"
    } else if bytes < GB {
        "xlarge"
    } else if bytes < 10 * GB {
        "huge"
    } else {
        "massive"
    }
}
