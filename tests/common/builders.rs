//! Builders for pipeline descriptions

/// Builder for `fakesrc` descriptions
pub struct FakeSrcBuilder {
    num_buffers: Option<i64>,
    sizetype: Option<&'static str>,
    sizemax: Option<usize>,
    filltype: Option<&'static str>,
    filters: Vec<String>,
}

impl FakeSrcBuilder {
    pub fn new() -> Self {
        Self {
            num_buffers: None,
            sizetype: None,
            sizemax: None,
            filltype: None,
            filters: Vec::new(),
        }
    }

    pub fn num_buffers(mut self, n: i64) -> Self {
        self.num_buffers = Some(n);
        self
    }

    /// Fixed-size buffers of `size` bytes
    pub fn fixed(mut self, size: usize) -> Self {
        self.sizetype = Some("fixed");
        self.sizemax = Some(size);
        self
    }

    pub fn filltype(mut self, filltype: &'static str) -> Self {
        self.filltype = Some(filltype);
        self
    }

    /// Append a downstream stage, e.g. `identity error-after=3`
    pub fn then(mut self, stage: &str) -> Self {
        self.filters.push(stage.to_string());
        self
    }

    pub fn build(self) -> String {
        let mut desc = String::from("fakesrc");
        if let Some(n) = self.num_buffers {
            desc.push_str(&format!(" num-buffers={}", n));
        }
        if let Some(sizetype) = self.sizetype {
            desc.push_str(&format!(" sizetype={}", sizetype));
        }
        if let Some(sizemax) = self.sizemax {
            desc.push_str(&format!(" sizemax={}", sizemax));
        }
        if let Some(filltype) = self.filltype {
            desc.push_str(&format!(" filltype={}", filltype));
        }
        for stage in self.filters {
            desc.push_str(" ! ");
            desc.push_str(&stage);
        }
        desc
    }
}

impl Default for FakeSrcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `videotestsrc` descriptions
pub struct VideoTestSrcBuilder {
    num_buffers: Option<i64>,
    size: Option<(u32, u32)>,
    framerate: Option<&'static str>,
    is_live: bool,
}

impl VideoTestSrcBuilder {
    pub fn new() -> Self {
        Self {
            num_buffers: None,
            size: None,
            framerate: None,
            is_live: false,
        }
    }

    pub fn num_buffers(mut self, n: i64) -> Self {
        self.num_buffers = Some(n);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn framerate(mut self, framerate: &'static str) -> Self {
        self.framerate = Some(framerate);
        self
    }

    pub fn live(mut self) -> Self {
        self.is_live = true;
        self
    }

    pub fn build(self) -> String {
        let mut desc = String::from("videotestsrc");
        if let Some(n) = self.num_buffers {
            desc.push_str(&format!(" num-buffers={}", n));
        }
        if let Some((w, h)) = self.size {
            desc.push_str(&format!(" width={} height={}", w, h));
        }
        if let Some(framerate) = self.framerate {
            desc.push_str(&format!(" framerate={}", framerate));
        }
        if self.is_live {
            desc.push_str(" is-live=true");
        }
        desc
    }
}

impl Default for VideoTestSrcBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fakesrc_builder() {
        let desc = FakeSrcBuilder::new()
            .num_buffers(5)
            .fixed(42)
            .then("identity")
            .build();
        assert_eq!(desc, "fakesrc num-buffers=5 sizetype=fixed sizemax=42 ! identity");
    }

    #[test]
    fn test_videotestsrc_builder() {
        let desc = VideoTestSrcBuilder::new().size(4, 2).live().build();
        assert_eq!(desc, "videotestsrc width=4 height=2 is-live=true");
    }
}
