use indicatif::{ProgressBar, ProgressStyle};

/// コンテキスト生成中のスピナー表示
pub struct BuildProgress {
    progress_bar: ProgressBar,
}

impl BuildProgress {
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_message(message.to_string());

        Self { progress_bar: pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.progress_bar.finish_with_message(message.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.progress_bar.finish_and_clear();
    }
}
