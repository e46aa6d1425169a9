pub mod tailer;
