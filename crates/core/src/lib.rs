//! Detect-then-track face lifecycle for video streams.
//!
//! A [`TrackLifecycleController`](tracking::domain::track_lifecycle_controller::TrackLifecycleController)
//! runs a face detector only while no face is being tracked, hands every
//! detection to its own tracker, and reports the surviving boxes per frame.
//! The `pipeline` module drives it over a decoded video.

pub mod shared {
    pub mod bounding_box;
    pub mod config_error;
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod video_metadata;
}

pub mod detection {
    pub mod domain {
        pub mod detection_config;
        pub mod face_detector;
    }
    pub mod infrastructure;
}

pub mod tracking {
    pub mod domain {
        pub mod object_tracker;
        pub mod track;
        pub mod track_lifecycle_controller;
    }
    pub mod infrastructure;
}

pub mod annotation {
    pub mod domain {
        pub mod frame_annotator;
        pub mod region_sink;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod infrastructure {
        pub mod threaded_pipeline_executor;
    }
    pub mod pipeline_executor;
    pub mod pipeline_logger;
    pub mod track_faces_use_case;
}

pub mod video {
    pub mod domain {
        pub mod video_reader;
        pub mod video_writer;
    }
    pub mod infrastructure {
        pub mod ffmpeg_reader;
        pub mod ffmpeg_writer;
    }
}
